use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use ems_domain::{OpportunityRecord, RunSummary, ScanResult};
use itertools::Itertools;
use thousands::Separable;

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .force_no_tty()
        .enforce_styling()
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn isk(value: f64) -> String {
    format!("{:.2}", value).separate_with_commas()
}

pub fn scan_overview(result: &ScanResult) -> String {
    format!(
        "{} ({}) | regions: {} | items scanned: {}/{} | partial: {} | cached: {} | runtime: {:.2}s",
        result.start_system_name,
        result.start_system_id.0,
        result.regions.iter().map(|r| r.0).join(", "),
        result.items_scanned,
        result.sample_size,
        result.partial,
        result.cached,
        result.runtime_sec,
    )
}

pub fn opportunities_table(records: &[OpportunityRecord]) -> String {
    let mut table = new_table(vec![
        "Item",
        "Destination",
        "Jumps",
        "Sec",
        "Buy",
        "Sell",
        "Margin %",
        "Units",
        "Total Profit",
        "Profit/Jump",
    ]);

    for r in records {
        table.add_row(vec![
            r.type_name.clone().unwrap_or_else(|| r.type_id.0.to_string()).as_str(),
            r.target_system_name
                .clone()
                .unwrap_or_else(|| r.target_system_id.0.to_string())
                .as_str(),
            r.jumps.to_string().as_str(),
            format!("{:.1}", r.security).as_str(),
            isk(r.home_price).as_str(),
            isk(r.target_price).as_str(),
            format!("{:.1}", r.margin_pct).as_str(),
            r.max_units_traded.separate_with_commas().as_str(),
            isk(r.total_profit).as_str(),
            isk(r.profit_per_jump).as_str(),
        ]);
    }

    table.to_string()
}

pub fn history_table(runs: &[RunSummary]) -> String {
    let mut table = new_table(vec![
        "Started",
        "Status",
        "Duration",
        "Successes",
        "Failures",
        "Fresh",
        "Opportunities",
        "Errors",
    ]);

    for run in runs {
        let errors = run.errors.iter().map(|(system, msg)| format!("{system}: {msg}")).join("\n");
        table.add_row(vec![
            run.started_at.format("%Y-%m-%d %H:%M:%S").to_string().as_str(),
            run.status.to_string().as_str(),
            format!("{:.2}s", run.duration_sec).as_str(),
            run.successes.to_string().as_str(),
            run.failures.to_string().as_str(),
            run.skipped_fresh.to_string().as_str(),
            run.total_opportunities.to_string().as_str(),
            errors.as_str(),
        ]);
    }

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ems_domain::{OpportunityMode, SystemId, TypeId};

    #[test]
    fn isk_values_are_grouped() {
        assert_eq!(isk(1_234_567.891), "1,234,567.89");
        assert_eq!(isk(12.5), "12.50");
    }

    #[test]
    fn missing_names_fall_back_to_ids() {
        let record = OpportunityRecord {
            mode: OpportunityMode::Instant,
            type_id: TypeId(34),
            type_name: None,
            home_price: 5.0,
            home_volume: 1_000,
            target_price: 7.0,
            target_system_id: SystemId(30002187),
            target_system_name: None,
            jumps: 9,
            security: 0.9,
            profit_per_unit: 1.65,
            margin_pct: 33.0,
            fee_pct: 5.0,
            max_units_by_budget: 2_000_000,
            max_units_by_cargo: None,
            max_units_traded: 1_000,
            total_profit: 1_650.0,
            profit_per_jump: 183.33,
        };

        let rendered = opportunities_table(&[record]);

        assert!(rendered.contains("30002187"));
        assert!(rendered.contains("1,650.00"));
    }
}
