use crate::models::Prospect;
use std::collections::HashMap;

/// Legal-form suffixes ignored when matching company names.
const ENTITY_SUFFIXES: &[&str] = &[
    "llc", "inc", "incorporated", "corp", "corporation", "co", "company", "ltd", "lp", "llp",
];

/// Key used to match filings from the same debtor to one prospect.
///
/// Lowercases, drops punctuation and legal-form suffixes:
/// `"Acme Manufacturing, LLC"` and `"ACME MANUFACTURING INC."` share a key.
pub fn company_key(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !ENTITY_SUFFIXES.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Storage contract the scheduler relies on for prospects.
///
/// The in-memory [`ProspectIndex`] is the default; a persistent store can
/// implement the same trait.
pub trait ProspectRepository: Send {
    fn get(&self, id: &str) -> Option<Prospect>;

    fn find_by_company(&self, company_name: &str) -> Option<Prospect>;

    /// Inserts, or replaces the prospect with the same id.
    fn upsert(&mut self, prospect: Prospect);

    fn all(&self) -> Vec<Prospect>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Arena of prospects with id and company-name indexes.
#[derive(Debug, Default)]
pub struct ProspectIndex {
    arena: Vec<Prospect>,
    by_id: HashMap<String, usize>,
    by_company: HashMap<String, usize>,
}

impl ProspectIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProspectRepository for ProspectIndex {
    fn get(&self, id: &str) -> Option<Prospect> {
        self.by_id.get(id).map(|&slot| self.arena[slot].clone())
    }

    fn find_by_company(&self, company_name: &str) -> Option<Prospect> {
        self.by_company
            .get(&company_key(company_name))
            .map(|&slot| self.arena[slot].clone())
    }

    fn upsert(&mut self, prospect: Prospect) {
        let key = company_key(&prospect.company_name);

        match self.by_id.get(&prospect.id).copied() {
            Some(slot) => {
                let old_key = company_key(&self.arena[slot].company_name);
                if old_key != key {
                    self.by_company.remove(&old_key);
                }
                self.by_company.insert(key, slot);
                self.arena[slot] = prospect;
            }
            None => {
                let slot = self.arena.len();
                self.by_id.insert(prospect.id.clone(), slot);
                self.by_company.insert(key, slot);
                self.arena.push(prospect);
            }
        }
    }

    fn all(&self) -> Vec<Prospect> {
        self.arena.clone()
    }

    fn len(&self) -> usize {
        self.arena.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use chrono::{NaiveDate, Utc};

    fn prospect(id: &str, company: &str) -> Prospect {
        Prospect {
            id: id.to_string(),
            company_name: company.to_string(),
            industry: "services".into(),
            jurisdiction: "CA".into(),
            status: ProspectStatus::New,
            priority_score: 10.0,
            default_date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            days_since_default: 100,
            filings: vec![],
            growth_signals: vec![],
            health_score: HealthScore::neutral(Utc::now()),
            estimated_revenue: None,
            narrative: String::new(),
        }
    }

    #[test]
    fn test_company_key_ignores_case_punctuation_and_suffixes() {
        assert_eq!(company_key("Acme Manufacturing, LLC"), "acme manufacturing");
        assert_eq!(company_key("ACME MANUFACTURING INC."), "acme manufacturing");
        assert_ne!(company_key("Acme Tools"), company_key("Acme Manufacturing"));
    }

    #[test]
    fn test_upsert_inserts_and_replaces_by_id() {
        let mut index = ProspectIndex::new();
        index.upsert(prospect("p1", "Acme LLC"));
        index.upsert(prospect("p2", "Beta Corp"));
        assert_eq!(index.len(), 2);

        let mut updated = prospect("p1", "Acme LLC");
        updated.priority_score = 80.0;
        index.upsert(updated);

        assert_eq!(index.len(), 2);
        assert_eq!(index.get("p1").unwrap().priority_score, 80.0);
        assert_eq!(index.find_by_company("ACME, Inc.").unwrap().id, "p1");
        assert!(index.get("missing").is_none());
    }

    #[test]
    fn test_rename_moves_company_index() {
        let mut index = ProspectIndex::new();
        index.upsert(prospect("p1", "Old Name LLC"));
        index.upsert(prospect("p1", "New Name LLC"));

        assert!(index.find_by_company("Old Name").is_none());
        assert_eq!(index.find_by_company("New Name").unwrap().id, "p1");
    }
}
