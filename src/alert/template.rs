use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use crate::submissions::Counts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    Assignment,
    Done,
    Total,
    Finalized,
    Drafts,
    Unclaimed,
    Graders,
    Deadline,
}

impl Placeholder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Done => "done",
            Self::Total => "total",
            Self::Finalized => "finalized",
            Self::Drafts => "drafts",
            Self::Unclaimed => "unclaimed",
            Self::Graders => "graders",
            Self::Deadline => "deadline",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::Total | Self::Finalized | Self::Drafts | Self::Unclaimed
        )
    }

    /// `done` is the finalized fraction in `0.0..=1.0`; the others are plain counts.
    fn numeric_value(&self, counts: &Counts) -> Option<f64> {
        match self {
            Self::Done => Some(counts.done_percent() / 100.0),
            Self::Total => Some(counts.total as f64),
            Self::Finalized => Some(counts.finalized as f64),
            Self::Drafts => Some(counts.drafts as f64),
            Self::Unclaimed => Some(counts.unclaimed as f64),
            _ => None,
        }
    }
}

impl FromStr for Placeholder {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assignment" => Ok(Self::Assignment),
            "done" => Ok(Self::Done),
            "total" => Ok(Self::Total),
            "finalized" => Ok(Self::Finalized),
            "drafts" => Ok(Self::Drafts),
            "unclaimed" => Ok(Self::Unclaimed),
            "graders" => Ok(Self::Graders),
            "deadline" => Ok(Self::Deadline),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Notification,
    RecentGraders,
    Deadline,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::RecentGraders => "recent_graders",
            Self::Deadline => "deadline",
        }
    }

    pub fn allowed(&self) -> &'static [Placeholder] {
        use Placeholder::*;
        match self {
            Self::Notification => &[Assignment, Done, Total, Finalized, Drafts, Unclaimed],
            Self::RecentGraders => &[Assignment, Graders],
            Self::Deadline => &[
                Assignment, Deadline, Done, Total, Finalized, Drafts, Unclaimed,
            ],
        }
    }
}

impl Display for TemplateKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("undefined variable {{{name}}}; allowed: {allowed}")]
    UndefinedVariable { name: String, allowed: String },
    #[error("unterminated `{{` at byte {0}")]
    Unterminated(usize),
    #[error("unmatched `}}` at byte {0}")]
    UnmatchedClose(usize),
    #[error("unsupported format `{spec}` for {{{name}}}; numbers take `.N%`, `.Nf` or `d`")]
    UnsupportedFormat { name: String, spec: String },
}

/// Format spec after a `:` inside a numeric placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberFormat {
    Percent(usize),
    Fixed(usize),
    Integer,
}

impl NumberFormat {
    fn parse(spec: &str) -> Option<Self> {
        if spec == "d" {
            return Some(Self::Integer);
        }
        let kind = spec.chars().next_back()?;
        let precision = &spec[..spec.len() - kind.len_utf8()];
        let precision = match precision.strip_prefix('.') {
            Some(digits) => digits.parse().ok()?,
            None if precision.is_empty() => 6,
            None => return None,
        };
        match kind {
            '%' => Some(Self::Percent(precision)),
            'f' => Some(Self::Fixed(precision)),
            _ => None,
        }
    }

    fn apply(&self, value: f64) -> String {
        match self {
            Self::Percent(precision) => format!("{:.*}%", precision, value * 100.0),
            Self::Fixed(precision) => format!("{:.*}", precision, value),
            Self::Integer => format!("{}", value.round() as i64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(Placeholder, Option<NumberFormat>),
}

/// A message template with `{name}` placeholders, checked against the
/// variables its kind provides. `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    kind: TemplateKind,
    segments: Vec<Segment>,
}

/// Values available to a template at render time.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars<'a> {
    pub assignment: &'a str,
    pub counts: Counts,
    pub graders: String,
    pub deadline: String,
}

impl MessageTemplate {
    pub fn parse(kind: TemplateKind, raw: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(TemplateError::UnmatchedClose(pos)),
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        name.push(inner);
                    }
                    if !closed {
                        return Err(TemplateError::Unterminated(pos));
                    }
                    let (name, spec) = match name.split_once(':') {
                        Some((name, spec)) => (name.trim(), Some(spec.trim())),
                        None => (name.trim(), None),
                    };
                    let placeholder = name
                        .parse::<Placeholder>()
                        .ok()
                        .filter(|p| kind.allowed().contains(p))
                        .ok_or_else(|| TemplateError::UndefinedVariable {
                            name: name.to_string(),
                            allowed: kind
                                .allowed()
                                .iter()
                                .map(|p| p.as_str())
                                .collect::<Vec<_>>()
                                .join(", "),
                        })?;
                    let format = match spec.filter(|s| !s.is_empty()) {
                        None => None,
                        Some(spec) => Some(
                            NumberFormat::parse(spec)
                                .filter(|_| placeholder.is_numeric())
                                .ok_or_else(|| TemplateError::UnsupportedFormat {
                                    name: name.to_string(),
                                    spec: spec.to_string(),
                                })?,
                        ),
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Var(placeholder, format));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { kind, segments })
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn render(&self, vars: &TemplateVars<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Var(placeholder, None) => out.push_str(&render_var(*placeholder, vars)),
                Segment::Var(placeholder, Some(format)) => {
                    let value = placeholder.numeric_value(&vars.counts).unwrap_or_default();
                    out.push_str(&format.apply(value));
                }
            }
        }
        out
    }
}

fn render_var(placeholder: Placeholder, vars: &TemplateVars<'_>) -> String {
    match placeholder {
        Placeholder::Assignment => vars.assignment.to_string(),
        Placeholder::Done => format!("{:.2}%", vars.counts.done_percent()),
        Placeholder::Total => vars.counts.total.to_string(),
        Placeholder::Finalized => vars.counts.finalized.to_string(),
        Placeholder::Drafts => vars.counts.drafts.to_string(),
        Placeholder::Unclaimed => vars.counts.unclaimed.to_string(),
        Placeholder::Graders => vars.graders.clone(),
        Placeholder::Deadline => vars.deadline.clone(),
    }
}

/// The three compiled message templates of a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templates {
    pub notification: MessageTemplate,
    pub recent_graders: MessageTemplate,
    pub deadline: MessageTemplate,
}

/// Sorted, deduplicated, backtick-wrapped and comma-joined.
pub fn format_graders<'a>(graders: impl IntoIterator<Item = &'a str>) -> String {
    let mut unique: Vec<&str> = graders.into_iter().collect();
    unique.sort_unstable();
    unique.dedup();
    unique
        .iter()
        .map(|g| format!("`{g}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts() -> Counts {
        Counts {
            total: 3,
            finalized: 2,
            drafts: 0,
            unclaimed: 1,
        }
    }

    #[test]
    fn renders_all_notification_variables() {
        let template = MessageTemplate::parse(
            TemplateKind::Notification,
            "*{assignment}*: {done} done ({finalized}/{total}, {drafts} drafts, {unclaimed} left)",
        )
        .unwrap();
        let vars = TemplateVars {
            assignment: "Loops",
            counts: counts(),
            ..Default::default()
        };
        assert_eq!(
            template.render(&vars),
            "*Loops*: 66.67% done (2/3, 0 drafts, 1 left)"
        );
    }

    #[test]
    fn escaped_braces_are_literal() {
        let template =
            MessageTemplate::parse(TemplateKind::Notification, "{{{assignment}}} {{x}}").unwrap();
        let vars = TemplateVars {
            assignment: "A",
            ..Default::default()
        };
        assert_eq!(template.render(&vars), "{A} {x}");
    }

    #[test]
    fn rejects_variables_outside_kind() {
        let err = MessageTemplate::parse(TemplateKind::Notification, "{graders}").unwrap_err();
        assert!(matches!(err, TemplateError::UndefinedVariable { ref name, .. } if name == "graders"));
        let err = MessageTemplate::parse(TemplateKind::Deadline, "{graders:.2%}").unwrap_err();
        assert!(matches!(err, TemplateError::UndefinedVariable { ref name, .. } if name == "graders"));
    }

    #[test]
    fn honors_number_format_specs() {
        let template = MessageTemplate::parse(
            TemplateKind::Notification,
            "*{assignment}*: {done:.2%} done ({finalized} finalized, {drafts} drafts, {unclaimed} left to grade)",
        )
        .unwrap();
        let vars = TemplateVars {
            assignment: "Loops",
            counts: counts(),
            ..Default::default()
        };
        assert_eq!(
            template.render(&vars),
            "*Loops*: 66.67% done (2 finalized, 0 drafts, 1 left to grade)"
        );

        let template =
            MessageTemplate::parse(TemplateKind::Deadline, "{done:.3f} {total:d} {unclaimed:.1f} {done:%}")
                .unwrap();
        assert_eq!(template.render(&vars), "0.667 3 1.0 66.666667%");
    }

    #[test]
    fn rejects_unsupported_format_specs() {
        let err = MessageTemplate::parse(TemplateKind::Notification, "{done:>10}").unwrap_err();
        assert!(matches!(err, TemplateError::UnsupportedFormat { ref spec, .. } if spec == ">10"));
        let err = MessageTemplate::parse(TemplateKind::Deadline, "{assignment:.2f}").unwrap_err();
        assert!(matches!(err, TemplateError::UnsupportedFormat { ref name, .. } if name == "assignment"));
    }

    #[test]
    fn rejects_broken_braces() {
        assert_eq!(
            MessageTemplate::parse(TemplateKind::Notification, "abc {done").unwrap_err(),
            TemplateError::Unterminated(4)
        );
        assert_eq!(
            MessageTemplate::parse(TemplateKind::Notification, "abc } def").unwrap_err(),
            TemplateError::UnmatchedClose(4)
        );
    }

    #[test]
    fn zero_total_is_zero_percent() {
        let template = MessageTemplate::parse(TemplateKind::Deadline, "{done}").unwrap();
        let vars = TemplateVars::default();
        assert_eq!(template.render(&vars), "0.00%");
    }

    #[test]
    fn graders_are_sorted_and_deduplicated() {
        assert_eq!(
            format_graders(["z@x.edu", "a@x.edu", "z@x.edu"]),
            "`a@x.edu`, `z@x.edu`"
        );
        assert_eq!(format_graders(Vec::<&str>::new()), "");
    }
}
