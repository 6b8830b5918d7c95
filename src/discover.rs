use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::{CohortCode, DatasetDescriptor};
use crate::error::PipelineError;

pub trait DatasetCatalog: Send + Sync {
    fn discover(
        &self,
        project_tag: &str,
        max_count: usize,
    ) -> Result<Vec<DatasetDescriptor>, PipelineError>;
}

#[derive(Clone)]
pub struct XenaCatalog {
    client: Client,
    hub_url: String,
    download_base: String,
}

impl XenaCatalog {
    pub fn new(hub_url: String, download_base: String) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("xena-sting/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::Discovery(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| PipelineError::Discovery(err.to_string()))?;
        Ok(Self {
            client,
            hub_url,
            download_base,
        })
    }
}

impl DatasetCatalog for XenaCatalog {
    fn discover(
        &self,
        project_tag: &str,
        max_count: usize,
    ) -> Result<Vec<DatasetDescriptor>, PipelineError> {
        let response = self
            .client
            .get(&self.hub_url)
            .send()
            .map_err(|err| PipelineError::Discovery(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(PipelineError::Discovery(format!(
                "hub returned status {status}"
            )));
        }
        let html = response
            .text()
            .map_err(|err| PipelineError::Discovery(err.to_string()))?;
        parse_cohort_listing(&html, project_tag, &self.download_base, max_count)
    }
}

pub fn parse_cohort_listing(
    html: &str,
    project_tag: &str,
    download_base: &str,
    max_count: usize,
) -> Result<Vec<DatasetDescriptor>, PipelineError> {
    if html.trim().is_empty() {
        return Ok(Vec::new());
    }

    let anchor = Regex::new(r#"<a[^>]*href="[^"]*"[^>]*>([^<]+)</a>"#)
        .map_err(|err| PipelineError::Discovery(err.to_string()))?;
    let code = Regex::new(r"\(([A-Z]{2,10})\)").expect("cohort code pattern");

    let mut saw_anchor = false;
    let mut saw_cohort = false;
    let mut descriptors: Vec<DatasetDescriptor> = Vec::new();

    for capture in anchor.captures_iter(html) {
        saw_anchor = true;
        let text = capture[1].trim();
        let Some(code_capture) = code.captures(text) else {
            continue;
        };
        saw_cohort = true;
        if !text.contains(project_tag) {
            continue;
        }
        let Ok(cohort) = code_capture[1].parse::<CohortCode>() else {
            continue;
        };
        let Ok(descriptor) = descriptor_for_cohort(&cohort, project_tag, download_base) else {
            continue;
        };
        if descriptors
            .iter()
            .any(|existing| existing.dataset_id == descriptor.dataset_id)
        {
            continue;
        }
        descriptors.push(descriptor);
        if descriptors.len() == max_count {
            break;
        }
    }

    if !saw_anchor || !saw_cohort {
        return Err(PipelineError::Discovery(
            "no cohort entries parsed from a non-empty listing; page structure may have changed"
                .to_string(),
        ));
    }

    Ok(descriptors)
}

pub fn descriptor_for_cohort(
    cohort: &CohortCode,
    project_tag: &str,
    download_base: &str,
) -> Result<DatasetDescriptor, PipelineError> {
    let dataset_id = format!("{project_tag}.{}.HiSeqV2_PANCAN", cohort.as_str()).parse()?;
    Ok(DatasetDescriptor {
        dataset_id,
        download_url: format!(
            "{download_base}/{project_tag}.{}.sampleMap%2FHiSeqV2_PANCAN.gz",
            cohort.as_str()
        ),
        file_name: format!("{}_HiSeqV2_PANCAN.tsv.gz", cohort.as_str()),
        project_tag: project_tag.to_string(),
        cohort: cohort.clone(),
    })
}
