//! Map a work item to the concrete parameters its remote job needs
//!
//! Generation is pure and total: every work item gets at least the base keys, known analysis
//! types add their fixed flags, and the item's custom parameters are applied last so they can
//! override anything generated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::batch::{AnalysisType, WorkItem};

/// Root of the reference bundles on the platform
static REFERENCE_ROOT: &str = "/reference-data";

/// Where jobs write their outputs inside the platform workspace
static OUTPUT_DIRECTORY: &str = "/output";

static ENRICHMENT_BED_PADDING: u64 = 100;

/// Run parameters, keyed by platform flag name
///
/// Ordered so the serialised params file is stable for a given work item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, Value>);

impl ParameterSet {
    pub fn new() -> Self {
        ParameterSet(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Last write wins per key
    pub fn merge(&mut self, other: &BTreeMap<String, Value>) {
        for (key, value) in other {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl From<BTreeMap<String, Value>> for ParameterSet {
    fn from(map: BTreeMap<String, Value>) -> Self {
        ParameterSet(map)
    }
}

fn reference_path(reference: &str, file: &str) -> String {
    format!("{REFERENCE_ROOT}/{reference}/{file}")
}

pub fn generate(item: &WorkItem) -> ParameterSet {
    let mut params = ParameterSet::new();
    params.insert("sample-id", json!(item.id));
    params.insert("reference-tar", json!(reference_path(&item.reference_name, &format!("{}.fa", item.reference_name))));
    params.insert("output-directory", json!(OUTPUT_DIRECTORY));

    match &item.analysis_type {
        AnalysisType::Germline => {
            params.insert("enable-map-align", json!(true));
            params.insert("enable-sort", json!(true));
            params.insert("enable-duplicate-marking", json!(true));
            params.insert("enable-variant-caller", json!(true));
        }
        AnalysisType::Rna => {
            params.insert("enable-rna", json!(true));
            params.insert("enable-rna-quantification", json!(true));
            params.insert("annotation-file", json!(reference_path(&item.reference_name, "genes.gtf")));
        }
        AnalysisType::Enrichment => {
            params.insert("enable-map-align", json!(true));
            params.insert("enable-variant-caller", json!(true));
            params.insert("vc-target-bed", json!(item.target_regions_path));
            params.insert("vc-target-bed-padding", json!(ENRICHMENT_BED_PADDING));
        }
        AnalysisType::Other(_) => {}
    }

    params.merge(&item.custom_parameters);
    params
}
