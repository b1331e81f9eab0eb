//! Cross-file consistency checks between the entity pool and a view

use serde::Serialize;

use crate::error::{IntegrityError, IntegrityIssue, IssueScope};
use crate::graph::RelationGraph;
use crate::model::{GraphState, View};

/// Outcome of a validation pass. Errors block writes; warnings are
/// tolerated by hydration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<IntegrityIssue>,
    pub warnings: Vec<IntegrityIssue>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<Vec<IntegrityIssue>, IntegrityError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(IntegrityError {
                issues: self.errors,
            })
        }
    }
}

/// Flat, display-ready form for the CLI and HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl From<&ValidationReport> for ValidationSummary {
    fn from(report: &ValidationReport) -> Self {
        ValidationSummary {
            ok: report.is_ok(),
            errors: report.errors.iter().map(ToString::to_string).collect(),
            warnings: report.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Global edges must connect nodes of the pool.
pub fn check_pool(state: &GraphState) -> Result<(), IntegrityError> {
    let (_, issues) = RelationGraph::from_pool(state);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(IntegrityError { issues })
    }
}

/// Check a view and every snapshot in its timeline against the pool.
pub fn validate_view(state: &GraphState, view: &View) -> ValidationReport {
    let mut report = ValidationReport::default();

    let (_, pool_issues) = RelationGraph::from_pool(state);
    report.errors.extend(pool_issues);

    for snapshot in view.timeline.ordered() {
        let (_, issues) = RelationGraph::from_snapshot(snapshot);
        report.errors.extend(issues);

        let scope = IssueScope::Snapshot(snapshot.id.clone());
        for node in snapshot.layout.keys() {
            if state.node(node).is_none() {
                report.warnings.push(IntegrityIssue::MissingEntity {
                    node: node.clone(),
                    scope: scope.clone(),
                });
            }
        }
        for node in snapshot.node_properties.keys() {
            if !snapshot.layout.contains_key(node) {
                report.warnings.push(IntegrityIssue::OrphanOverride {
                    node: node.clone(),
                    scope: scope.clone(),
                });
            }
        }
    }

    report
}
