// Cadence Core - Auto-progression condition model
//
// A step's auto-progression rule is a closed tagged union, parsed and
// validated once when the workflow template is loaded. The former JSON
// metadata blob is not re-interpreted per tick; an unparseable condition
// fails template loading, and an unparseable delay fails closed at
// evaluation time.

use crate::entity::EntitySnapshot;
use regex::Regex;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use std::sync::OnceLock;

/// Auto-progression condition attached to a workflow step
///
/// Absent conditions mean the step is manual-only: it is never auto-advanced
/// and waits for an external approval action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutoProgressCondition {
    /// Satisfied when every listed entity field is filled (and the optional
    /// gate expression holds)
    FieldCompletion {
        /// Expected entity type; mismatches never satisfy
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity: Option<String>,

        /// Field names that must be non-null / non-empty
        fields: Vec<String>,

        /// Optional gate, e.g. "dataSubjectNotificationRequired = true"
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<ConditionExpr>,
    },

    /// Satisfied when the entity's risk score is within the organization's
    /// risk appetite (bound supplied by an external provider)
    RiskAppetite {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity: Option<String>,

        /// Field holding the numeric risk score
        #[serde(rename = "riskScoreField", default = "default_risk_score_field")]
        risk_score_field: String,

        /// Optional field selecting a category-specific appetite
        #[serde(
            rename = "categoryField",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        category_field: Option<String>,
    },

    /// Satisfied once the step has been current for at least `delay`
    TimeBased {
        /// Delay, e.g. "24 hours", "30 minutes", "2 days"
        delay: Delay,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<ConditionExpr>,
    },

    /// Satisfied by a static predicate over the entity; used for
    /// notification steps without a real approval gate
    Auto {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<ConditionExpr>,
    },
}

fn default_risk_score_field() -> String {
    "residualRisk".to_string()
}

// ============================================================================
// Delay strings
// ============================================================================

/// A delay of the form `"<integer> (minute|minutes|hour|hours|day|days)"`
///
/// The raw string is kept for round-tripping; an unparseable delay carries
/// `None` and never satisfies a time-based condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Delay {
    raw: String,
    duration: Option<chrono::Duration>,
}

fn delay_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(\d+)\s+(minute|minutes|hour|hours|day|days)$").expect("static regex")
    })
}

impl Delay {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let duration = delay_regex().captures(raw.trim()).and_then(|caps| {
            let amount: i64 = caps[1].parse().ok()?;
            let unit = caps[2].to_ascii_lowercase();
            Some(match unit.as_str() {
                "minute" | "minutes" => chrono::Duration::minutes(amount),
                "hour" | "hours" => chrono::Duration::hours(amount),
                "day" | "days" => chrono::Duration::days(amount),
                _ => return None,
            })
        });
        Self { raw, duration }
    }

    /// Parsed duration, or `None` for an invalid delay string
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.duration
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Serialize for Delay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Delay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Delay::parse(raw))
    }
}

// ============================================================================
// Condition expressions
// ============================================================================

/// Comparison operators supported by the expression language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Ge,
    Le,
    Gt,
    Lt,
    Eq,
    Ne,
}

/// Literal on the right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

/// Parsed expression tree: comparisons joined by AND/OR, OR binding loosest
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Cmp {
        field: String,
        op: CmpOp,
        value: Literal,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

/// A validated condition expression, e.g.
/// `"(severity >= high AND affectedCount > 100) OR notificationRequired = true"`
///
/// Parsed once at template-load time; evaluation is a pure function of an
/// entity snapshot. Any reference to an unknown field makes the whole
/// expression unsatisfied.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionExpr {
    raw: String,
    root: Expr,
}

impl ConditionExpr {
    /// Evaluate against an entity snapshot. Fails closed: unknown fields or
    /// uncomparable values make the result `false`.
    pub fn evaluate(&self, snapshot: &EntitySnapshot) -> bool {
        match eval_expr(&self.root, snapshot) {
            Some(v) => v,
            None => {
                tracing::warn!(
                    condition = %self.raw,
                    "Condition references unknown or uncomparable fields; treating as not satisfied"
                );
                false
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for ConditionExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ConditionExpr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let root = parse_expr(s)?;
        Ok(Self {
            raw: s.to_string(),
            root,
        })
    }
}

impl Serialize for ConditionExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ConditionExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|e| D::Error::custom(format!("invalid condition expression: {}", e)))
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn cmp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\w+)\s*(>=|<=|!=|>|<|=)\s*(.+)$").expect("static regex"))
}

/// Split on a top-level keyword (" AND " / " OR "), honoring parentheses
fn split_top_level<'a>(input: &'a str, keyword: &str) -> Vec<&'a str> {
    let bytes = input.as_bytes();
    let kw = keyword.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ => {
                if depth == 0 && bytes[i..].starts_with(kw) {
                    parts.push(&input[start..i]);
                    i += kw.len();
                    start = i;
                    continue;
                }
            }
        }
        i += 1;
    }
    parts.push(&input[start..]);
    parts
}

/// Strip one matching pair of outer parentheses, if they wrap the whole input
fn strip_outer_parens(input: &str) -> &str {
    let trimmed = input.trim();
    if !(trimmed.starts_with('(') && trimmed.ends_with(')')) {
        return trimmed;
    }
    let inner = &trimmed[1..trimmed.len() - 1];
    // Only strip when the parens actually match each other
    let mut depth = 0i32;
    for b in inner.bytes() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                // A close before the end means the outer pair does not wrap
                // the whole expression, e.g. "(a) OR (b)"
                if depth < 0 {
                    return trimmed;
                }
            }
            _ => {}
        }
    }
    if depth == 0 {
        inner.trim()
    } else {
        trimmed
    }
}

fn parse_expr(input: &str) -> Result<Expr, String> {
    let input = strip_outer_parens(input);
    if input.is_empty() {
        return Err("empty expression".to_string());
    }

    let or_parts = split_top_level(input, " OR ");
    if or_parts.len() > 1 {
        let exprs = or_parts
            .iter()
            .map(|p| parse_expr(p))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Expr::Or(exprs));
    }

    let and_parts = split_top_level(input, " AND ");
    if and_parts.len() > 1 {
        let exprs = and_parts
            .iter()
            .map(|p| parse_expr(p))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Expr::And(exprs));
    }

    parse_comparison(input)
}

fn parse_comparison(input: &str) -> Result<Expr, String> {
    let caps = cmp_regex()
        .captures(input.trim())
        .ok_or_else(|| format!("expected '<field> <op> <literal>', got '{}'", input.trim()))?;

    let field = caps[1].to_string();
    let op = match &caps[2] {
        ">=" => CmpOp::Ge,
        "<=" => CmpOp::Le,
        ">" => CmpOp::Gt,
        "<" => CmpOp::Lt,
        "=" => CmpOp::Eq,
        "!=" => CmpOp::Ne,
        other => return Err(format!("unknown operator '{}'", other)),
    };
    let value = parse_literal(caps[3].trim());

    Ok(Expr::Cmp { field, op, value })
}

fn parse_literal(raw: &str) -> Literal {
    let unquoted = raw.trim_matches('\'').trim_matches('"');
    match unquoted {
        "null" => Literal::Null,
        "true" => Literal::Bool(true),
        "false" => Literal::Bool(false),
        _ => match unquoted.parse::<f64>() {
            Ok(n) => Literal::Number(n),
            Err(_) => Literal::Str(unquoted.to_string()),
        },
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// `None` means the expression could not be evaluated (unknown field,
/// uncomparable types) and the caller must treat it as not satisfied.
fn eval_expr(expr: &Expr, snapshot: &EntitySnapshot) -> Option<bool> {
    match expr {
        Expr::And(parts) => {
            for part in parts {
                if !eval_expr(part, snapshot)? {
                    return Some(false);
                }
            }
            Some(true)
        }
        Expr::Or(parts) => {
            for part in parts {
                if eval_expr(part, snapshot)? {
                    return Some(true);
                }
            }
            Some(false)
        }
        Expr::Cmp { field, op, value } => eval_comparison(field, *op, value, snapshot),
    }
}

fn eval_comparison(
    field: &str,
    op: CmpOp,
    expected: &Literal,
    snapshot: &EntitySnapshot,
) -> Option<bool> {
    use serde_json::Value;

    // Null comparisons test presence; a missing field counts as null
    if let Literal::Null = expected {
        let is_null = matches!(snapshot.get(field), None | Some(Value::Null));
        return match op {
            CmpOp::Eq => Some(is_null),
            CmpOp::Ne => Some(!is_null),
            _ => None,
        };
    }

    let actual = snapshot.get(field)?;

    match (actual, expected) {
        (Value::Bool(a), Literal::Bool(b)) => match op {
            CmpOp::Eq => Some(a == b),
            CmpOp::Ne => Some(a != b),
            _ => None,
        },
        (Value::Number(_), Literal::Number(b)) | (Value::String(_), Literal::Number(b)) => {
            let a = snapshot.get_number(field)?;
            Some(compare_ord(a.partial_cmp(b)?, op))
        }
        (Value::String(a), Literal::Str(b)) => Some(compare_ord(a.as_str().cmp(b.as_str()), op)),
        (Value::String(a), Literal::Bool(b)) => {
            // Tolerate boolean-ish strings from loosely typed sources
            let parsed: bool = a.parse().ok()?;
            match op {
                CmpOp::Eq => Some(parsed == *b),
                CmpOp::Ne => Some(parsed != *b),
                _ => None,
            }
        }
        _ => None,
    }
}

fn compare_ord(ord: std::cmp::Ordering, op: CmpOp) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CmpOp::Ge => ord != Less,
        CmpOp::Le => ord != Greater,
        CmpOp::Gt => ord == Greater,
        CmpOp::Lt => ord == Less,
        CmpOp::Eq => ord == Equal,
        CmpOp::Ne => ord != Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: serde_json::Value) -> EntitySnapshot {
        serde_json::from_value(value).unwrap()
    }

    fn expr(s: &str) -> ConditionExpr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_delay() {
        assert_eq!(
            Delay::parse("24 hours").duration(),
            Some(chrono::Duration::hours(24))
        );
        assert_eq!(
            Delay::parse("1 hour").duration(),
            Some(chrono::Duration::hours(1))
        );
        assert_eq!(
            Delay::parse("30 minutes").duration(),
            Some(chrono::Duration::minutes(30))
        );
        assert_eq!(
            Delay::parse("2 days").duration(),
            Some(chrono::Duration::days(2))
        );
        assert_eq!(Delay::parse("soon").duration(), None);
        assert_eq!(Delay::parse("24h").duration(), None);
        assert_eq!(Delay::parse("-3 hours").duration(), None);
    }

    #[test]
    fn test_simple_comparisons() {
        let snap = snapshot(json!({
            "severity": "high",
            "affectedCount": 250,
            "notificationRequired": true
        }));

        assert!(expr("severity = high").evaluate(&snap));
        assert!(expr("severity != low").evaluate(&snap));
        assert!(expr("affectedCount > 100").evaluate(&snap));
        assert!(expr("affectedCount <= 250").evaluate(&snap));
        assert!(!expr("affectedCount < 100").evaluate(&snap));
        assert!(expr("notificationRequired = true").evaluate(&snap));
        assert!(!expr("notificationRequired = false").evaluate(&snap));
    }

    #[test]
    fn test_quoted_literals() {
        let snap = snapshot(json!({"status": "pending"}));
        assert!(expr("status = 'pending'").evaluate(&snap));
        assert!(expr("status = \"pending\"").evaluate(&snap));
    }

    #[test]
    fn test_null_sentinel() {
        let snap = snapshot(json!({"resolvedAt": null, "severity": "low"}));
        assert!(expr("resolvedAt = null").evaluate(&snap));
        assert!(expr("missingField = null").evaluate(&snap));
        assert!(expr("severity != null").evaluate(&snap));
        assert!(!expr("severity = null").evaluate(&snap));
    }

    #[test]
    fn test_and_or_precedence() {
        let snap = snapshot(json!({"severity": "high", "affectedCount": 50, "flagged": true}));

        // AND binds tighter than OR
        assert!(expr("severity = high AND affectedCount > 100 OR flagged = true").evaluate(&snap));
        assert!(!expr("severity = high AND affectedCount > 100").evaluate(&snap));
        assert!(
            expr("(severity = high AND affectedCount > 10) OR flagged = false").evaluate(&snap)
        );
    }

    #[test]
    fn test_unknown_field_fails_whole_expression() {
        let snap = snapshot(json!({"flagged": true}));
        // The OR branch on flagged would be true, but the unknown field
        // poisons the whole expression
        assert!(!expr("mystery > 3 OR flagged = true").evaluate(&snap));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<ConditionExpr>().is_err());
        assert!("severity".parse::<ConditionExpr>().is_err());
        assert!("severity ~ high".parse::<ConditionExpr>().is_err());
    }

    #[test]
    fn test_tagged_union_deserialization() {
        let yaml = r#"
type: field_completion
entity: DataBreach
fields: [severity, affectedDataSubjectsCount]
condition: "severity >= high"
"#;
        let cond: AutoProgressCondition = serde_yaml::from_str(yaml).unwrap();
        match cond {
            AutoProgressCondition::FieldCompletion {
                entity,
                fields,
                condition,
            } => {
                assert_eq!(entity.as_deref(), Some("DataBreach"));
                assert_eq!(fields.len(), 2);
                assert!(condition.is_some());
            }
            other => panic!("unexpected condition: {:?}", other),
        }

        let yaml = r#"
type: time_based
delay: "24 hours"
"#;
        let cond: AutoProgressCondition = serde_yaml::from_str(yaml).unwrap();
        match cond {
            AutoProgressCondition::TimeBased { delay, .. } => {
                assert_eq!(delay.duration(), Some(chrono::Duration::hours(24)));
            }
            other => panic!("unexpected condition: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_condition_kind_is_rejected_at_load() {
        let yaml = "type: crystal_ball\n";
        assert!(serde_yaml::from_str::<AutoProgressCondition>(yaml).is_err());
    }

    #[test]
    fn test_invalid_expression_is_rejected_at_load() {
        let yaml = "type: auto\ncondition: \"severity ~~ high\"\n";
        assert!(serde_yaml::from_str::<AutoProgressCondition>(yaml).is_err());
    }

    #[test]
    fn test_risk_appetite_defaults() {
        let yaml = "type: risk_appetite\nentity: Risk\n";
        let cond: AutoProgressCondition = serde_yaml::from_str(yaml).unwrap();
        match cond {
            AutoProgressCondition::RiskAppetite {
                risk_score_field, ..
            } => assert_eq!(risk_score_field, "residualRisk"),
            other => panic!("unexpected condition: {:?}", other),
        }
    }
}
