//! Post-scrub validator. Serializes the whole anonymized record and re-runs
//! every PII detector over each string, failing closed on any hit.

use serde_json::Value;
use std::collections::BTreeSet;

use super::patterns::find_pii;
use crate::error::PipelineError;
use crate::records::AnonymizedRecord;

pub fn validate(rec: &AnonymizedRecord) -> Result<(), PipelineError> {
    let value = serde_json::to_value(rec).map_err(|_| PipelineError::AnonymizationViolation {
        record_id: rec.record_id.clone(),
        patterns: vec!["unserializable"],
    })?;

    let mut hits = BTreeSet::new();
    scan(&value, &mut hits);

    if hits.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::AnonymizationViolation {
            record_id: rec.record_id.clone(),
            patterns: hits.into_iter().collect(),
        })
    }
}

fn scan(v: &Value, hits: &mut BTreeSet<&'static str>) {
    match v {
        Value::String(s) => hits.extend(find_pii(s).into_iter().map(|f| f.pattern)),
        Value::Array(items) => items.iter().for_each(|i| scan(i, hits)),
        Value::Object(map) => {
            for (k, val) in map {
                hits.extend(find_pii(k).into_iter().map(|f| f.pattern));
                scan(val, hits);
            }
        }
        _ => {}
    }
}
