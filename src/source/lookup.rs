//! Per-run cache for point lookups.
//!
//! Subject and employee names rarely change, so one cycle resolves each id
//! at most once. A fresh cache is created at the start of every cycle.

use std::collections::HashMap;

use tracing::warn;

use super::TicketSource;

#[derive(Debug, Default)]
pub struct LookupCache {
    subjects: HashMap<u32, String>,
    employees: HashMap<String, String>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subject label, or `unknown (<id>)` if the source has none.
    ///
    /// Lookup failures fall back to the placeholder without caching it, so a
    /// later ticket in the same cycle gets another try.
    pub async fn subject(&mut self, source: &dyn TicketSource, subject_id: u32) -> String {
        if let Some(name) = self.subjects.get(&subject_id) {
            return name.clone();
        }
        let fallback = format!("unknown ({subject_id})");
        match source.subject_name(subject_id).await {
            Ok(name) => {
                let name = name.unwrap_or(fallback);
                self.subjects.insert(subject_id, name.clone());
                name
            }
            Err(e) => {
                warn!(subject_id, error = %e, "subject lookup failed");
                fallback
            }
        }
    }

    /// Employee name, or `not found` if the source has none.
    pub async fn employee(&mut self, source: &dyn TicketSource, employee_id: &str) -> String {
        if let Some(name) = self.employees.get(employee_id) {
            return name.clone();
        }
        match source.employee_name(employee_id).await {
            Ok(name) => {
                let name = name.unwrap_or_else(|| "not found".to_string());
                self.employees.insert(employee_id.to_string(), name.clone());
                name
            }
            Err(e) => {
                warn!(employee_id, error = %e, "employee lookup failed");
                "not found".to_string()
            }
        }
    }
}
