use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

/// Analysis family a pipeline belongs to, selecting the generated parameter rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Germline,
    Rna,
    Enrichment,
    Other(String),
}

impl AnalysisType {
    /// Derive the type from a pipeline name such as `dragen-germline` or `RNA`
    pub fn from_pipeline(pipeline: &str) -> Self {
        let name = pipeline.trim();
        let lowered = name.to_ascii_lowercase();
        let family = lowered.strip_prefix("dragen-").unwrap_or(&lowered);
        match family {
            "germline" => AnalysisType::Germline,
            "rna" => AnalysisType::Rna,
            "enrichment" => AnalysisType::Enrichment,
            _ => AnalysisType::Other(name.to_string()),
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnalysisType::Germline => write!(f, "germline"),
            AnalysisType::Rna => write!(f, "rna"),
            AnalysisType::Enrichment => write!(f, "enrichment"),
            AnalysisType::Other(name) => write!(f, "{name}"),
        }
    }
}

/// One sample and its analysis configuration, processed by exactly one pipeline run
///
/// Read-only once parsed from the sample sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkItem {
    pub id: String,
    pub source_location: PathBuf,
    /// Pipeline name as known to the platform
    pub pipeline: String,
    pub analysis_type: AnalysisType,
    pub reference_name: String,
    pub target_regions_path: Option<String>,
    pub custom_parameters: BTreeMap<String, Value>,
}

impl WorkItem {
    pub fn new(
        id: impl Into<String>,
        source_location: impl Into<PathBuf>,
        pipeline: impl Into<String>,
        reference_name: impl Into<String>,
    ) -> Self {
        let pipeline = pipeline.into();
        WorkItem {
            id: id.into(),
            source_location: source_location.into(),
            analysis_type: AnalysisType::from_pipeline(&pipeline),
            pipeline,
            reference_name: reference_name.into(),
            target_regions_path: None,
            custom_parameters: BTreeMap::new(),
        }
    }

    pub fn with_target_regions(mut self, path: impl Into<String>) -> Self {
        self.target_regions_path = Some(path.into());
        self
    }

    pub fn with_custom_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom_parameters.insert(key.into(), value);
        self
    }
}
