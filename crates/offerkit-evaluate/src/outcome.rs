//! Outcome tree produced by evaluation stages.
//!
//! Every stage reports one [`EvaluationOutcome`]: PASS or FAIL, the stage that
//! produced it, a stable [`ReasonCode`], a human-readable detail, optional child
//! outcomes, and the operations the stage wants to submit.
//!
//! A node's type is fixed at construction and never derived from its children.
//! Aggregating stages decide their own type and attach children for
//! traceability.
//!
//! ```
//! use offerkit_evaluate::{fail, pass, EvaluationOutcome, ReasonCode};
//!
//! let cpu = pass!("ScalarResourceStage", ReasonCode::Reserved, "reserved {} cpus", 1.5);
//! let ports = fail!("PortsStage", ReasonCode::PortUnavailable, "port {} is taken", 8080);
//! let all_passed = cpu.is_passing() && ports.is_passing();
//!
//! let root = EvaluationOutcome::new(all_passed, "OfferEvaluator", ReasonCode::Aggregate, "1 of 2 stages passed")
//!     .with_children(vec![cpu, ports]);
//! assert!(!root.is_passing());
//! assert_eq!(root.children()[1].to_string(), "FAIL(PortsStage): port 8080 is taken");
//! ```

use std::fmt::{self, Display, Write as _};

use serde::Serialize;

use crate::recommendation::OfferRecommendation;
use crate::{EvaluateError, Result};

/// Whether an outcome passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeType {
    /// The evaluation passed.
    Pass,
    /// The evaluation failed.
    Fail,
}

impl Display for OutcomeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        })
    }
}

/// Machine-readable classification of an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Aggregate over child outcomes.
    Aggregate,
    /// Resources were freshly reserved.
    Reserved,
    /// Resources reserved for the pod's prior incarnation were reused.
    Reused,
    /// Nothing was requested, so nothing was claimed.
    NotRequested,
    /// The offer lacks enough of a scalar resource.
    InsufficientResource,
    /// A requested port is not available.
    PortUnavailable,
    /// A persistent volume was created.
    VolumeCreated,
    /// No disk can satisfy a volume.
    VolumeUnavailable,
    /// A health or readiness check was attached.
    CheckAttached,
    /// A health or readiness check is unusable.
    CheckInvalid,
    /// Discovery information was attached.
    DiscoveryAttached,
    /// TLS material was provisioned.
    TlsProvisioned,
    /// TLS material could not be provisioned.
    TlsFailed,
    /// A task launch was assembled.
    LaunchReady,
    /// The stage refers to a task that is not part of the requirement.
    UnknownTask,
    /// Reason supplied by a stage outside this crate.
    Custom,
}

/// The outcome of one evaluation, possibly with nested sub-outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationOutcome {
    outcome_type: OutcomeType,
    source: String,
    code: ReasonCode,
    reason: String,
    children: Vec<EvaluationOutcome>,
    recommendations: Vec<OfferRecommendation>,
}

impl EvaluationOutcome {
    /// Create an outcome whose type is given as a boolean.
    #[must_use]
    pub fn new(
        passing: bool,
        source: impl Into<String>,
        code: ReasonCode,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            outcome_type: if passing {
                OutcomeType::Pass
            } else {
                OutcomeType::Fail
            },
            source: source.into(),
            code,
            reason: reason.into(),
            children: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    /// Create a passing outcome. See also the [`pass!`](crate::pass) macro.
    #[must_use]
    pub fn pass(source: impl Into<String>, code: ReasonCode, reason: impl Into<String>) -> Self {
        Self::new(true, source, code, reason)
    }

    /// Create a failing outcome. See also the [`fail!`](crate::fail) macro.
    #[must_use]
    pub fn fail(source: impl Into<String>, code: ReasonCode, reason: impl Into<String>) -> Self {
        Self::new(false, source, code, reason)
    }

    /// Create an outcome from a runtime template with `{}` placeholders.
    ///
    /// `{{` and `}}` render as literal braces.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluateError::ReasonArity`] if the number of placeholders
    /// differs from `args.len()`, or [`EvaluateError::InvalidTemplate`] if the
    /// template contains an unsupported or unbalanced brace.
    pub fn from_template(
        outcome_type: OutcomeType,
        source: impl Into<String>,
        code: ReasonCode,
        template: &str,
        args: &[&dyn Display],
    ) -> Result<Self> {
        let reason = render_template(template, args)?;
        Ok(Self::new(
            outcome_type == OutcomeType::Pass,
            source,
            code,
            reason,
        ))
    }

    /// Replace this node's recommendations with a single operation.
    #[must_use]
    pub fn with_recommendation(self, recommendation: OfferRecommendation) -> Self {
        self.with_recommendations(vec![recommendation])
    }

    /// Replace this node's recommendations. Children are not affected.
    #[must_use]
    pub fn with_recommendations(mut self, recommendations: Vec<OfferRecommendation>) -> Self {
        self.recommendations = recommendations;
        self
    }

    /// Replace this node's children.
    ///
    /// No consistency check is made between this node's type and the
    /// children's types.
    #[must_use]
    pub fn with_children(mut self, children: Vec<EvaluationOutcome>) -> Self {
        self.children = children;
        self
    }

    /// Whether this outcome passed.
    #[must_use]
    pub fn is_passing(&self) -> bool {
        self.outcome_type == OutcomeType::Pass
    }

    /// PASS or FAIL.
    #[must_use]
    pub fn outcome_type(&self) -> OutcomeType {
        self.outcome_type
    }

    /// Label of the evaluator that produced this outcome.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Stable reason code.
    #[must_use]
    pub fn code(&self) -> ReasonCode {
        self.code
    }

    /// Human-readable reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Child outcomes in insertion order.
    #[must_use]
    pub fn children(&self) -> &[EvaluationOutcome] {
        &self.children
    }

    /// Operations attached directly to this node.
    #[must_use]
    pub fn recommendations(&self) -> &[OfferRecommendation] {
        &self.recommendations
    }

    /// All operations in the tree, depth-first preorder: this node's own, then
    /// each child's collected operations in child order.
    ///
    /// Operations are collected regardless of whether the node that carries
    /// them passed. Nothing is deduplicated.
    #[must_use]
    pub fn collect_recommendations(&self) -> Vec<OfferRecommendation> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(&self, out: &mut Vec<OfferRecommendation>) {
        out.extend(self.recommendations.iter().cloned());
        for child in &self.children {
            child.collect_into(out);
        }
    }

    /// Number of nodes in the tree, including this one.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }

    /// Render the whole tree, one node per line, indented by depth.
    #[must_use]
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let _ = writeln!(out, "{:indent$}{self}", "", indent = depth * 2);
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

impl Display for EvaluationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}): {}", self.outcome_type, self.source, self.reason)
    }
}

/// Render `template`, substituting each `{}` with the next argument.
///
/// # Errors
///
/// See [`EvaluationOutcome::from_template`].
pub fn render_template(template: &str, args: &[&dyn Display]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut used = 0usize;
    let mut placeholders = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' if chars.peek() == Some(&'}') => {
                chars.next();
                if let Some(arg) = args.get(used) {
                    let _ = write!(out, "{arg}");
                    used += 1;
                }
                placeholders += 1;
            }
            '{' => {
                return Err(EvaluateError::InvalidTemplate(format!(
                    "unsupported placeholder in '{template}'"
                )));
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(EvaluateError::InvalidTemplate(format!(
                    "unmatched '}}' in '{template}'"
                )));
            }
            other => out.push(other),
        }
    }

    if placeholders != args.len() {
        return Err(EvaluateError::ReasonArity {
            expected: placeholders,
            got: args.len(),
        });
    }
    Ok(out)
}

/// Build a passing [`EvaluationOutcome`] with a formatted reason.
///
/// Arguments are checked against the format string at compile time.
#[macro_export]
macro_rules! pass {
    ($source:expr, $code:expr, $($fmt:tt)+) => {
        $crate::EvaluationOutcome::pass($source, $code, ::std::format!($($fmt)+))
    };
}

/// Build a failing [`EvaluationOutcome`] with a formatted reason.
///
/// Arguments are checked against the format string at compile time.
#[macro_export]
macro_rules! fail {
    ($source:expr, $code:expr, $($fmt:tt)+) => {
        $crate::EvaluationOutcome::fail($source, $code, ::std::format!($($fmt)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::{Resource, CPUS};
    use offerkit_core::OfferId;

    fn reserve(amount: f64) -> OfferRecommendation {
        OfferRecommendation::Reserve {
            offer_id: OfferId::new("offer-1").unwrap(),
            resource: Resource::scalar(CPUS, amount),
        }
    }

    #[test]
    fn display_format() {
        let outcome = EvaluationOutcome::pass("CpuStage", ReasonCode::Reserved, "ok");
        assert_eq!(outcome.to_string(), "PASS(CpuStage): ok");
        let outcome = fail!("PortsStage", ReasonCode::PortUnavailable, "port {} taken", 80);
        assert_eq!(outcome.to_string(), "FAIL(PortsStage): port 80 taken");
    }

    #[test]
    fn defaults_are_empty() {
        let outcome = EvaluationOutcome::fail("X", ReasonCode::Custom, "nope");
        assert!(outcome.children().is_empty());
        assert!(outcome.recommendations().is_empty());
        assert!(outcome.collect_recommendations().is_empty());
        assert_eq!(outcome.code(), ReasonCode::Custom);
    }

    #[test]
    fn collects_preorder() {
        let grandchild = EvaluationOutcome::pass("gc", ReasonCode::Reserved, "gc")
            .with_recommendation(reserve(3.0));
        let child_a = EvaluationOutcome::pass("a", ReasonCode::Reserved, "a")
            .with_recommendation(reserve(2.0))
            .with_children(vec![grandchild]);
        let child_b = EvaluationOutcome::fail("b", ReasonCode::Custom, "b")
            .with_recommendation(reserve(4.0));
        let root = EvaluationOutcome::pass("root", ReasonCode::Aggregate, "root")
            .with_recommendation(reserve(1.0))
            .with_children(vec![child_a, child_b]);

        let amounts: Vec<f64> = root
            .collect_recommendations()
            .iter()
            .map(|r| match r {
                OfferRecommendation::Reserve { resource, .. } => resource.as_scalar().unwrap(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(amounts, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn does_not_deduplicate() {
        let rec = reserve(1.0);
        let root = EvaluationOutcome::pass("root", ReasonCode::Aggregate, "")
            .with_recommendation(rec.clone())
            .with_children(vec![
                EvaluationOutcome::pass("c", ReasonCode::Reserved, "").with_recommendation(rec)
            ]);
        assert_eq!(root.collect_recommendations().len(), 2);
    }

    #[test]
    fn later_assignment_replaces() {
        let outcome = EvaluationOutcome::pass("s", ReasonCode::Reserved, "")
            .with_recommendations(vec![reserve(1.0), reserve(2.0)])
            .with_recommendation(reserve(5.0));
        assert_eq!(outcome.recommendations(), &[reserve(5.0)]);
    }

    #[test]
    fn type_not_derived_from_children() {
        let outcome = EvaluationOutcome::pass("agg", ReasonCode::Aggregate, "")
            .with_children(vec![EvaluationOutcome::fail("c", ReasonCode::Custom, "")]);
        assert!(outcome.is_passing());
    }

    #[test]
    fn template_renders() {
        let outcome = EvaluationOutcome::from_template(
            OutcomeType::Fail,
            "S",
            ReasonCode::InsufficientResource,
            "need {} of {}, {{literal}}",
            &[&2.5_f64, &"cpus"],
        )
        .unwrap();
        assert_eq!(outcome.reason(), "need 2.5 of cpus, {literal}");
        assert!(!outcome.is_passing());
    }

    #[test]
    fn template_arity_mismatch_is_an_error() {
        let err = EvaluationOutcome::from_template(
            OutcomeType::Pass,
            "S",
            ReasonCode::Custom,
            "{} and {}",
            &[&1_i32],
        )
        .unwrap_err();
        assert!(matches!(err, EvaluateError::ReasonArity { expected: 2, got: 1 }));

        let err = render_template("none", &[&1_i32]).unwrap_err();
        assert!(matches!(err, EvaluateError::ReasonArity { expected: 0, got: 1 }));
    }

    #[test]
    fn template_rejects_bad_braces() {
        assert!(matches!(
            render_template("{0}", &[&1_i32]),
            Err(EvaluateError::InvalidTemplate(_))
        ));
        assert!(matches!(
            render_template("oops }", &[]),
            Err(EvaluateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn renders_indented_tree() {
        let root = EvaluationOutcome::fail("root", ReasonCode::Aggregate, "1 of 2").with_children(vec![
            EvaluationOutcome::pass("a", ReasonCode::Reserved, "ok"),
            EvaluationOutcome::fail("b", ReasonCode::Custom, "bad")
                .with_children(vec![EvaluationOutcome::fail("c", ReasonCode::Custom, "why")]),
        ]);
        assert_eq!(
            root.render_tree(),
            "FAIL(root): 1 of 2\n  PASS(a): ok\n  FAIL(b): bad\n    FAIL(c): why\n"
        );
        assert_eq!(root.node_count(), 4);
    }
}
