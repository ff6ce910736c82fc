use std::sync::Arc;

use anyhow::bail;
use rally_resilience::domain::{PaymentProcessor, PaymentRequest, PaymentResponse};
use rally_resilience::{FileQueue, ResilienceConfig, ResilienceRegistry};

use crate::cli::DrillArgs;
use crate::gateway::SimulatedGateway;

pub async fn run(config: ResilienceConfig, args: DrillArgs) -> anyhow::Result<()> {
    if let Some(unknown) = args
        .fail_gateways
        .iter()
        .find(|name| !config.gateways.priority.contains(name))
    {
        bail!("unknown gateway '{unknown}', expected one of: {}", config.gateways.priority.join(", "));
    }

    let mut builder = ResilienceRegistry::builder().with_config(config);
    if let Some(path) = &args.queue_file {
        builder = builder.with_queue(Arc::new(FileQueue::new(path)));
    }
    let registry = Arc::new(builder.build()?);

    let mut processor = PaymentProcessor::new(Arc::clone(&registry));
    for name in registry.plan().priority() {
        let failing = args.fail_gateways.contains(name);
        processor = processor.with_gateway(Arc::new(SimulatedGateway::new(name, failing)));
    }

    for i in 0..args.count {
        let actor = args.actor.clone().unwrap_or_else(|| format!("drill-member-{i}"));
        let request = PaymentRequest::new(args.amount, &args.method, actor);
        let outcome = processor.process_payment(request).await?;
        println!("{}", serde_json::to_string(&PaymentResponse::from(&outcome))?);
    }

    let status = registry.system_status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
