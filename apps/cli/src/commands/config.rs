use rally_resilience::ResilienceConfig;

pub fn check(config: &ResilienceConfig) -> anyhow::Result<()> {
    println!("configuration ok");

    println!("breakers:");
    let default = config.default_breaker;
    println!(
        "  {:<20} failure_threshold={} success_threshold={} recovery_timeout={:?}",
        "(default)", default.failure_threshold, default.success_threshold, default.recovery_timeout
    );
    for (name, breaker) in &config.breakers {
        println!(
            "  {name:<20} failure_threshold={} success_threshold={} recovery_timeout={:?}",
            breaker.failure_threshold, breaker.success_threshold, breaker.recovery_timeout
        );
    }

    println!("gateways: {}", config.gateways.priority.join(" > "));
    for (method, gateways) in &config.gateways.compatibility {
        println!("  {method:<20} {}", gateways.join(", "));
    }
    Ok(())
}

pub fn show(config: &ResilienceConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
