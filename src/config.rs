use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::GeneSymbol;
use crate::error::PipelineError;
use crate::panel::GenePanel;

pub const DEFAULT_HUB_URL: &str = "https://xenabrowser.net/datapages/?hub=https://tcga.xenahubs.net:443";
pub const DEFAULT_DOWNLOAD_BASE: &str = "https://tcga-xena-hub.s3.us-east-1.amazonaws.com/download";
pub const DEFAULT_UNIT: &str = "log2(norm_count+1)";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub panel: Vec<PanelEntry>,
    #[serde(default)]
    pub project_tag: Option<String>,
    #[serde(default)]
    pub hub_url: Option<String>,
    #[serde(default)]
    pub download_base: Option<String>,
    #[serde(default)]
    pub clinical_urls: Vec<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub max_datasets: Option<usize>,
    #[serde(default)]
    pub include_clinical: Option<bool>,
    #[serde(default)]
    pub use_sample_data: Option<bool>,
    #[serde(default)]
    pub store_root: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PanelEntry {
    Shorthand(String),
    Detailed(PanelEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PanelEntryObject {
    pub symbol: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub schema_version: u32,
    pub panel: GenePanel,
    pub project_tag: String,
    pub hub_url: String,
    pub download_base: String,
    pub clinical_urls: Vec<String>,
    pub unit: String,
    pub max_datasets: usize,
    pub include_clinical: bool,
    pub use_sample_data: bool,
    pub store_root: Option<Utf8PathBuf>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<PipelineConfig, PipelineError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("xena-sting.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::empty());
        }
        if !config_path.exists() {
            return Err(PipelineError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<PipelineConfig, PipelineError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let panel = if config.panel.is_empty() {
            GenePanel::new(default_target_panel())
        } else {
            let entries = config
                .panel
                .into_iter()
                .map(|entry| match entry {
                    PanelEntry::Shorthand(value) => Ok((value.parse::<GeneSymbol>()?, Vec::new())),
                    PanelEntry::Detailed(obj) => {
                        let symbol = obj.symbol.parse::<GeneSymbol>()?;
                        let aliases = obj
                            .aliases
                            .iter()
                            .map(|alias| alias.parse::<GeneSymbol>())
                            .collect::<Result<Vec<_>, PipelineError>>()?;
                        Ok((symbol, aliases))
                    }
                })
                .collect::<Result<Vec<_>, PipelineError>>()?;
            GenePanel::new(entries)
        };

        Ok(PipelineConfig {
            schema_version,
            panel,
            project_tag: config.project_tag.unwrap_or_else(|| "TCGA".to_string()),
            hub_url: config.hub_url.unwrap_or_else(|| DEFAULT_HUB_URL.to_string()),
            download_base: config
                .download_base
                .unwrap_or_else(|| DEFAULT_DOWNLOAD_BASE.to_string()),
            clinical_urls: if config.clinical_urls.is_empty() {
                default_clinical_urls()
            } else {
                config.clinical_urls
            },
            unit: config.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            max_datasets: config.max_datasets.unwrap_or(1),
            include_clinical: config.include_clinical.unwrap_or(false),
            use_sample_data: config.use_sample_data.unwrap_or(false),
            store_root: config.store_root.map(Utf8PathBuf::from),
        })
    }
}

impl Config {
    pub fn empty() -> Self {
        Self {
            schema_version: None,
            panel: Vec::new(),
            project_tag: None,
            hub_url: None,
            download_base: None,
            clinical_urls: Vec::new(),
            unit: None,
            max_datasets: None,
            include_clinical: None,
            use_sample_data: None,
            store_root: None,
        }
    }
}

pub fn default_target_panel() -> Vec<(GeneSymbol, Vec<GeneSymbol>)> {
    fn gene(symbol: &str) -> GeneSymbol {
        symbol.parse().expect("default panel symbol")
    }

    vec![
        (gene("C6orf150"), vec![gene("CGAS"), gene("MB21D1")]),
        (gene("TMEM173"), vec![gene("STING"), gene("STING1")]),
        (gene("CCL5"), vec![gene("RANTES")]),
        (gene("CXCL10"), vec![]),
        (gene("CXCL9"), vec![]),
        (gene("CXCL11"), vec![]),
        (gene("IL6"), vec![]),
        (gene("CXCL8"), vec![gene("IL8")]),
        (gene("NFKB1"), vec![]),
        (gene("IKBKE"), vec![]),
        (gene("IRF3"), vec![]),
        (gene("TREX1"), vec![]),
        (gene("ATM"), vec![]),
    ]
}

pub fn default_clinical_urls() -> Vec<String> {
    vec![
        format!("{DEFAULT_DOWNLOAD_BASE}/survival%2FTCGA_survival_data_2.tsv"),
        format!("{DEFAULT_DOWNLOAD_BASE}/TCGA.survival.tsv"),
    ]
}
