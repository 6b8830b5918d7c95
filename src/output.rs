use std::io::{self, Write};

use serde::Serialize;

use crate::domain::RunSummary;
use crate::pipeline::{ProgressEvent, ProgressSink, StatusResult};
use crate::report::ReportResult;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_status(result: &StatusResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_report(result: &ReportResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TextOutput;

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}

impl TextOutput {
    pub fn print_run_summary(summary: &RunSummary) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        println!("{cyan}xena-sting run {}{reset}", summary.run_id);
        println!(
            "{green}datasets: {} succeeded / {} attempted{reset}",
            summary.datasets_succeeded, summary.datasets_attempted
        );
        println!(
            "{green}records loaded: {}{reset}",
            summary.records_loaded
        );
        if summary.records_failed > 0 {
            println!("{yellow}records failed: {}{reset}", summary.records_failed);
        }
        for failure in &summary.datasets_failed {
            println!(
                "{red}failed: {} during {}: {}{reset}",
                failure.dataset_id, failure.stage, failure.reason
            );
        }
        if summary.cancelled {
            println!("{yellow}run cancelled before completion{reset}");
        }
    }

    pub fn print_status(result: &StatusResult) {
        println!("archived datasets:  {}", result.archived_datasets);
        println!("expression records: {}", result.expression_records);
    }

    pub fn print_report(result: &ReportResult) {
        for dataset in &result.datasets {
            println!("{} ({} sample(s))", dataset.dataset_id, dataset.samples);
            for gene in &dataset.genes {
                let mean = gene
                    .mean
                    .map(|value| format!("{value:.4}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {:<12} records={:<6} missing={:<6} mean={mean}",
                    gene.gene_symbol, gene.records, gene.missing
                );
            }
        }
        if result.datasets.is_empty() {
            println!("no expression records loaded yet");
        }
    }
}
