use crate::cli_args::{EsiArgs, ScanArgs};
use ems_core::{RefreshFlags, ScanRequest, ScannerConfiguration};
use std::time::Duration;

pub fn scanner_configuration(args: &EsiArgs) -> ScannerConfiguration {
    ScannerConfiguration {
        esi_base_url: args.esi_base_url.clone(),
        user_agent: args.user_agent.clone(),
        cache_dir: args.cache_dir.clone(),
        esi_sleep: Duration::from_secs_f64(args.esi_sleep.max(0.0)),
        esi_retries: args.esi_retries,
        esi_timeout: Duration::from_secs_f64(args.esi_timeout.max(0.0)),
        scan_cache_ttl: Duration::from_secs(args.scan_cache_ttl),
    }
}

pub fn scan_request(args: &ScanArgs) -> ScanRequest {
    ScanRequest {
        start_system: args.start_system.clone(),
        budget: args.budget,
        max_jumps: args.max_jumps,
        min_security: args.min_security,
        min_margin_pct: args.min_margin_pct,
        sample_size: args.sample_size,
        types_pages: args.types_pages,
        order_pages: args.order_pages,
        home_order_pages: args.home_order_pages,
        max_price: args.max_price,
        mode: args.mode,
        tax_pct: args.tax_pct,
        broker_pct: args.broker_pct,
        limit: args.limit,
        max_runtime_sec: args.max_runtime_sec,
        sample_seed: args.sample_seed,
        cargo_volume: args.cargo_volume,
        min_profit_per_jump: args.min_profit_per_jump,
        min_results: args.min_results,
        refresh: RefreshFlags {
            cache: args.refresh_cache,
            nearby: args.refresh_nearby,
            types: args.refresh_types,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli_args::{Cli, Commands};
    use clap::Parser;
    use ems_domain::ScanMode;

    #[test]
    fn scan_flags_map_onto_the_request() {
        let cli = Cli::parse_from([
            "main",
            "scan",
            "--start-system",
            "Amarr",
            "--mode",
            "instant",
            "--cargo-volume",
            "12000",
            "--refresh-nearby",
        ]);

        let Commands::Scan(args) = cli.command else {
            panic!("expected the scan command");
        };
        let request = scan_request(&args);

        assert_eq!(request.start_system, "Amarr");
        assert_eq!(request.mode, ScanMode::Instant);
        assert_eq!(request.cargo_volume, Some(12_000.0));
        assert!(request.refresh.nearby);
        assert!(!request.refresh.cache);
        assert_eq!(request.limit, ScanRequest::default().limit);
        assert_eq!(request.sample_size, ScanRequest::default().sample_size);
    }

    #[test]
    fn esi_durations_are_read_in_seconds() {
        let cli = Cli::parse_from(["main", "--esi-sleep", "0.25", "--esi-timeout", "5", "history"]);

        let cfg = scanner_configuration(&cli.esi);

        assert_eq!(cfg.esi_sleep, Duration::from_millis(250));
        assert_eq!(cfg.esi_timeout, Duration::from_secs(5));
    }
}
