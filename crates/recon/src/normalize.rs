//! Record normalization: raw rows to canonical dated facts.
//!
//! Normalization never fails on content. A descriptor it cannot read is
//! tagged [`UNKNOWN_TAG`] and left for the validator's tag audit.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::{AgeConfig, PipelineConfig};
use crate::model::{
    CanonicalFact, RawCaseRecord, RawDailyRecord, AGE_DIMENSION, CLUSTER_DIMENSION, UNKNOWN_TAG,
    UNPUBLISHED_TAG,
};

const BELOW_MARKERS: [&str; 4] = ["未満", "under", "below", "<"];
const ABOVE_MARKERS: [&str; 4] = ["以上", "over", "+", ">"];

fn leading_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid number regex"))
}

// ---------------------------------------------------------------------------
// Age buckets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AgeBuckets {
    minimum: u32,
    maximum: u32,
    step: u32,
    undisclosed: Vec<String>,
}

impl AgeBuckets {
    pub fn from_config(config: &AgeConfig) -> Self {
        Self {
            minimum: config.minimum,
            maximum: config.maximum,
            step: config.step,
            undisclosed: config.undisclosed.iter().map(|m| m.to_lowercase()).collect(),
        }
    }

    pub fn below_label(&self) -> String {
        format!("<{}", self.minimum)
    }

    pub fn top_label(&self) -> String {
        format!("{}+", self.maximum)
    }

    /// Every bucket in display order, `unpublished` last.
    pub fn labels(&self) -> Vec<String> {
        let mut labels = vec![self.below_label()];
        let mut lo = self.minimum;
        while lo < self.maximum {
            labels.push(self.range_label(lo));
            lo += self.step;
        }
        labels.push(self.top_label());
        labels.push(UNPUBLISHED_TAG.to_string());
        labels
    }

    fn range_label(&self, lo: u32) -> String {
        format!("{lo}-{}", lo + self.step - 1)
    }

    /// Map a free-text age descriptor onto a bucket label.
    pub fn classify(&self, descriptor: Option<&str>) -> String {
        let Some(text) = descriptor.map(str::trim).filter(|t| !t.is_empty()) else {
            return UNKNOWN_TAG.to_string();
        };
        let lowered = text.to_lowercase();

        if self.undisclosed.iter().any(|m| lowered.contains(m.as_str())) {
            return UNPUBLISHED_TAG.to_string();
        }

        let Some(age) = leading_number()
            .find(&lowered)
            .and_then(|m| m.as_str().parse::<u32>().ok())
        else {
            return UNKNOWN_TAG.to_string();
        };

        let below = BELOW_MARKERS.iter().any(|m| lowered.contains(m));
        let above = ABOVE_MARKERS.iter().any(|m| lowered.contains(m));

        match (below, above) {
            (true, true) => UNKNOWN_TAG.to_string(),
            // "10代未満" is below the minimum; "30未満" spans buckets and is not guessed at.
            (true, false) if age <= self.minimum => self.below_label(),
            (true, false) => UNKNOWN_TAG.to_string(),
            (false, true) if age >= self.maximum => self.top_label(),
            (false, true) => UNKNOWN_TAG.to_string(),
            (false, false) if age < self.minimum => self.below_label(),
            (false, false) if age >= self.maximum => self.top_label(),
            (false, false) => {
                let lo = self.minimum + (age - self.minimum) / self.step * self.step;
                self.range_label(lo)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Record normalizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Normalizer {
    ages: AgeBuckets,
    clusters: Vec<String>,
    unlinked: String,
    exclude_ids: HashSet<String>,
}

impl Normalizer {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let cases = &config.sources.cases;
        Self {
            ages: AgeBuckets::from_config(&config.age),
            clusters: cases.columns.clusters.clone(),
            unlinked: config.clusters.unlinked.clone(),
            exclude_ids: cases.exclude_ids.iter().map(|id| id.trim().to_string()).collect(),
        }
    }

    pub fn age_buckets(&self) -> &AgeBuckets {
        &self.ages
    }

    pub fn age_categories(&self) -> Vec<String> {
        self.ages.labels()
    }

    /// Configured clusters followed by the unlinked label.
    pub fn cluster_categories(&self) -> Vec<String> {
        let mut categories = self.clusters.clone();
        categories.push(self.unlinked.clone());
        categories
    }

    /// One case row to one fact; `None` for excluded rows.
    pub fn normalize_case(&self, record: &RawCaseRecord) -> Option<CanonicalFact> {
        if record.excluded || self.exclude_ids.contains(record.id.trim()) {
            return None;
        }

        let mut fact = CanonicalFact::new(record.date, 1)
            .with_tag(AGE_DIMENSION, self.ages.classify(record.age.as_deref()));

        let mut linked = false;
        for (cluster, set) in &record.clusters {
            if *set {
                fact = fact.with_tag(CLUSTER_DIMENSION, cluster.clone());
                linked = true;
            }
        }
        if !linked {
            fact = fact.with_tag(CLUSTER_DIMENSION, self.unlinked.clone());
        }

        Some(fact)
    }
}

/// One daily-aggregate row to one untagged fact carrying the positive count.
pub fn normalize_daily(record: &RawDailyRecord) -> CanonicalFact {
    CanonicalFact::new(record.date, record.positive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn buckets() -> AgeBuckets {
        AgeBuckets::from_config(&AgeConfig::default())
    }

    fn case(id: &str, age: Option<&str>, clusters: &[(&str, bool)]) -> RawCaseRecord {
        RawCaseRecord {
            row: 1,
            id: id.into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
            age: age.map(String::from),
            clusters: clusters.iter().map(|(c, s)| (c.to_string(), *s)).collect(),
            excluded: false,
            raw_fields: BTreeMap::new(),
        }
    }

    fn normalizer() -> Normalizer {
        Normalizer {
            ages: buckets(),
            clusters: vec!["hospital_a".into(), "nursery_b".into()],
            unlinked: "unlinked".into(),
            exclude_ids: HashSet::from(["99".to_string()]),
        }
    }

    #[test]
    fn bucket_labels_in_order() {
        let labels = buckets().labels();
        assert_eq!(labels.first().unwrap(), "<10");
        assert_eq!(labels[1], "10-19");
        assert_eq!(labels[8], "80-89");
        assert_eq!(labels[9], "90+");
        assert_eq!(labels.last().unwrap(), "unpublished");
        assert_eq!(labels.len(), 11);
    }

    #[test]
    fn classify_decades() {
        let b = buckets();
        assert_eq!(b.classify(Some("20代")), "20-29");
        assert_eq!(b.classify(Some("20s")), "20-29");
        assert_eq!(b.classify(Some(" 47 ")), "40-49");
        assert_eq!(b.classify(Some("80")), "80-89");
    }

    #[test]
    fn classify_edges() {
        let b = buckets();
        assert_eq!(b.classify(Some("10代未満")), "<10");
        assert_eq!(b.classify(Some("under 10")), "<10");
        assert_eq!(b.classify(Some("0")), "<10");
        assert_eq!(b.classify(Some("90代以上")), "90+");
        assert_eq!(b.classify(Some("100")), "90+");
        assert_eq!(b.classify(Some("90+")), "90+");
    }

    #[test]
    fn classify_undisclosed_is_its_own_bucket() {
        let b = buckets();
        assert_eq!(b.classify(Some("非公表")), UNPUBLISHED_TAG);
        assert_eq!(b.classify(Some("Undisclosed")), UNPUBLISHED_TAG);
    }

    #[test]
    fn classify_malformed_is_sentinel() {
        let b = buckets();
        assert_eq!(b.classify(None), UNKNOWN_TAG);
        assert_eq!(b.classify(Some("  ")), UNKNOWN_TAG);
        assert_eq!(b.classify(Some("adult")), UNKNOWN_TAG);
        // Spans several buckets; not guessed.
        assert_eq!(b.classify(Some("30未満")), UNKNOWN_TAG);
        assert_eq!(b.classify(Some("50以上")), UNKNOWN_TAG);
    }

    #[test]
    fn multiple_clusters_all_recorded() {
        let n = normalizer();
        let fact = n
            .normalize_case(&case("1", Some("30代"), &[("hospital_a", true), ("nursery_b", true)]))
            .unwrap();
        assert_eq!(fact.count, 1);
        assert!(fact.has_tag(CLUSTER_DIMENSION, "hospital_a"));
        assert!(fact.has_tag(CLUSTER_DIMENSION, "nursery_b"));
        assert!(!fact.has_tag(CLUSTER_DIMENSION, "unlinked"));
        assert!(fact.has_tag(AGE_DIMENSION, "30-39"));
    }

    #[test]
    fn no_cluster_flag_is_unlinked() {
        let n = normalizer();
        let fact = n
            .normalize_case(&case("1", Some("30代"), &[("hospital_a", false)]))
            .unwrap();
        assert_eq!(fact.tag_values(CLUSTER_DIMENSION).collect::<Vec<_>>(), vec!["unlinked"]);
    }

    #[test]
    fn excluded_records_produce_nothing() {
        let n = normalizer();
        assert!(n.normalize_case(&case("99", Some("30代"), &[])).is_none());

        let mut marked = case("5", Some("30代"), &[]);
        marked.excluded = true;
        assert!(n.normalize_case(&marked).is_none());
    }

    #[test]
    fn daily_record_carries_positive_count() {
        let rec = RawDailyRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
            tested: None,
            positive: 7,
        };
        let fact = normalize_daily(&rec);
        assert_eq!(fact.count, 7);
        assert!(fact.tags.is_empty());
    }
}
