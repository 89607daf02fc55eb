//! Fixed-shape summary tree filled from the latest cumulative snapshot.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ReconError;

/// One node of the configured tree, listed parent-before-child.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SummaryNodeConfig {
    pub metric: String,
    pub label: String,
    #[serde(default)]
    pub parent: Option<String>,
}

impl SummaryNodeConfig {
    fn new(metric: &str, label: &str, parent: Option<&str>) -> Self {
        Self {
            metric: metric.into(),
            label: label.into(),
            parent: parent.map(String::from),
        }
    }
}

/// The tree used when the config declares none.
pub fn default_tree() -> Vec<SummaryNodeConfig> {
    vec![
        SummaryNodeConfig::new("tested", "Tested", None),
        SummaryNodeConfig::new("confirmed", "Confirmed", Some("tested")),
        SummaryNodeConfig::new("hospitalized", "Hospitalized", Some("confirmed")),
        SummaryNodeConfig::new("mild", "Mild to moderate", Some("hospitalized")),
        SummaryNodeConfig::new("severe", "Severe", Some("hospitalized")),
        SummaryNodeConfig::new("hotel", "Hotel recuperation", Some("confirmed")),
        SummaryNodeConfig::new("adjusting", "Placement pending", Some("confirmed")),
        SummaryNodeConfig::new("awaiting_admission", "Awaiting admission", Some("adjusting")),
        SummaryNodeConfig::new("home", "Home recuperation", Some("confirmed")),
        SummaryNodeConfig::new("other", "Other facilities", Some("confirmed")),
        SummaryNodeConfig::new("deceased", "Deceased", Some("confirmed")),
        SummaryNodeConfig::new("discharged", "Discharged", Some("confirmed")),
    ]
}

/// Filled node as published: `{attr, value, children?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryNode {
    pub attr: String,
    pub value: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SummaryNode>,
}

#[derive(Debug, Clone)]
struct Slot {
    metric: String,
    label: String,
    children: Vec<usize>,
}

/// Arena form of the configured tree plus its pre-order traversal.
#[derive(Debug, Clone)]
pub struct SummaryTree {
    slots: Vec<Slot>,
    preorder: Vec<usize>,
}

impl SummaryTree {
    /// Build from a validated node list (first node is the root, parents declared first).
    pub fn from_nodes(nodes: &[SummaryNodeConfig]) -> Self {
        let mut slots: Vec<Slot> = Vec::with_capacity(nodes.len());
        for node in nodes {
            let idx = slots.len();
            slots.push(Slot {
                metric: node.metric.clone(),
                label: node.label.clone(),
                children: Vec::new(),
            });
            if let Some(parent) = &node.parent {
                if let Some(p) = slots[..idx].iter().position(|s| &s.metric == parent) {
                    slots[p].children.push(idx);
                }
            }
        }

        let mut preorder = Vec::with_capacity(slots.len());
        if !slots.is_empty() {
            let mut stack = vec![0usize];
            while let Some(i) = stack.pop() {
                preorder.push(i);
                stack.extend(slots[i].children.iter().rev());
            }
        }

        Self { slots, preorder }
    }

    /// Metric names in pre-order.
    pub fn preorder_metrics(&self) -> Vec<&str> {
        self.preorder.iter().map(|&i| self.slots[i].metric.as_str()).collect()
    }

    /// Fill from a snapshot's values, looking each node's metric up in `metrics`.
    pub fn fill(
        &self,
        date: NaiveDate,
        metrics: &[String],
        values: &[i64],
    ) -> Result<Option<SummaryNode>, ReconError> {
        let ordered: Vec<i64> = self
            .preorder_metrics()
            .iter()
            .map(|m| {
                metrics
                    .iter()
                    .position(|name| name == m)
                    .and_then(|i| values.get(i).copied())
                    .ok_or(ReconError::MetricArity {
                        date,
                        expected: metrics.len(),
                        found: values.len(),
                    })
            })
            .collect::<Result<_, _>>()?;
        self.fill_preorder(date, &ordered)
    }

    /// Assign values in one pass against the pre-order paths.
    pub fn fill_preorder(
        &self,
        date: NaiveDate,
        values: &[i64],
    ) -> Result<Option<SummaryNode>, ReconError> {
        if values.len() != self.preorder.len() {
            return Err(ReconError::MetricArity {
                date,
                expected: self.preorder.len(),
                found: values.len(),
            });
        }
        let mut assigned = vec![0i64; self.slots.len()];
        for (&slot, &value) in self.preorder.iter().zip(values) {
            assigned[slot] = value;
        }
        if self.slots.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.build(0, &assigned)))
    }

    fn build(&self, idx: usize, assigned: &[i64]) -> SummaryNode {
        let slot = &self.slots[idx];
        SummaryNode {
            attr: slot.label.clone(),
            value: assigned[idx],
            children: slot.children.iter().map(|&c| self.build(c, assigned)).collect(),
        }
    }
}

/// Capacity left over after `in_use`, never below zero.
pub fn remaining_capacity(capacity: u64, in_use: i64) -> u64 {
    if in_use <= 0 {
        capacity
    } else {
        capacity.saturating_sub(in_use as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 4).unwrap()
    }

    #[test]
    fn default_tree_preorder() {
        let tree = SummaryTree::from_nodes(&default_tree());
        assert_eq!(
            tree.preorder_metrics(),
            vec![
                "tested",
                "confirmed",
                "hospitalized",
                "mild",
                "severe",
                "hotel",
                "adjusting",
                "awaiting_admission",
                "home",
                "other",
                "deceased",
                "discharged",
            ]
        );
    }

    #[test]
    fn preorder_differs_from_declaration_order() {
        let nodes = vec![
            SummaryNodeConfig::new("root", "Root", None),
            SummaryNodeConfig::new("a", "A", Some("root")),
            SummaryNodeConfig::new("b", "B", Some("root")),
            SummaryNodeConfig::new("a1", "A1", Some("a")),
        ];
        let tree = SummaryTree::from_nodes(&nodes);
        assert_eq!(tree.preorder_metrics(), vec!["root", "a", "a1", "b"]);

        let filled = tree.fill_preorder(date(), &[10, 6, 2, 4]).unwrap().unwrap();
        assert_eq!(filled.children[0].attr, "A");
        assert_eq!(filled.children[0].children[0].value, 2);
        assert_eq!(filled.children[1].value, 4);
    }

    #[test]
    fn fill_by_metric_name() {
        let tree = SummaryTree::from_nodes(&default_tree());
        let metrics: Vec<String> = tree.preorder_metrics().iter().rev().map(|s| s.to_string()).collect();
        let values: Vec<i64> = (1..=12).rev().collect();
        let filled = tree.fill(date(), &metrics, &values).unwrap().unwrap();
        assert_eq!(filled.attr, "Tested");
        assert_eq!(filled.value, 1);
        assert_eq!(filled.children[0].value, 2);
        assert_eq!(filled.children[0].children.len(), 7);
    }

    #[test]
    fn leaf_serializes_without_children() {
        let tree = SummaryTree::from_nodes(&[SummaryNodeConfig::new("x", "X", None)]);
        let filled = tree.fill_preorder(date(), &[3]).unwrap().unwrap();
        let json = serde_json::to_value(&filled).unwrap();
        assert_eq!(json, serde_json::json!({"attr": "X", "value": 3}));
    }

    #[test]
    fn value_count_mismatch_is_error() {
        let tree = SummaryTree::from_nodes(&default_tree());
        assert!(tree.fill_preorder(date(), &[1, 2]).is_err());
    }

    #[test]
    fn remaining_clamps_at_zero() {
        assert_eq!(remaining_capacity(212, 150), 62);
        assert_eq!(remaining_capacity(212, 250), 0);
        assert_eq!(remaining_capacity(212, -1), 212);
    }
}
