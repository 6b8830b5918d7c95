use std::fmt::Write;

use crate::domain::DatasetDescriptor;
use crate::error::PipelineError;
use crate::panel::GenePanel;

const SAMPLE_SEED: u64 = 42;
const FILLER_GENES: usize = 20;
const SAMPLE_COUNT: usize = 30;

pub fn sample_descriptor() -> Result<DatasetDescriptor, PipelineError> {
    Ok(DatasetDescriptor {
        dataset_id: "SAMPLE.GeneExpression".parse()?,
        download_url: "sample://generated".to_string(),
        file_name: "sample_gene_expression.tsv".to_string(),
        project_tag: "SAMPLE".to_string(),
        cohort: "SAMPLE".parse()?,
    })
}

pub fn sample_matrix(panel: &GenePanel) -> Vec<u8> {
    let mut rng = Xorshift64::new(SAMPLE_SEED);

    let mut out = String::from("sample");
    for index in 1..=SAMPLE_COUNT {
        write!(out, "\tTCGA-SAMPLE-{index:04}").expect("write to string");
    }
    out.push('\n');

    let mut genes: Vec<String> = panel
        .symbols()
        .iter()
        .map(|symbol| symbol.as_str().to_string())
        .collect();
    for index in 1..=FILLER_GENES {
        genes.push(format!("Gene_{index}"));
    }

    for gene in genes {
        out.push_str(&gene);
        for _ in 0..SAMPLE_COUNT {
            write!(out, "\t{:.4}", rng.uniform(15.0)).expect("write to string");
        }
        out.push('\n');
    }
    out.into_bytes()
}

struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1),
        }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn uniform(&mut self, upper: f64) -> f64 {
        (self.next() as f64 / u64::MAX as f64) * upper
    }
}
