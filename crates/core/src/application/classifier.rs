// Output Classifier
//
// Ordered (predicate -> classification) rows, first match wins.
// New transient signatures are added with `with_rule`; callers never change.

use serde::Serialize;
use tracing::warn;

use super::constants::SELF_REPORT_PREFIX;

/// Which output stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// Streams a rule is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamScope {
    StdoutOnly,
    Both,
}

impl StreamScope {
    fn accepts(&self, stream: OutputStream) -> bool {
        match self {
            StreamScope::StdoutOnly => stream == OutputStream::Stdout,
            StreamScope::Both => true,
        }
    }
}

/// Text predicate over a single line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    StartsWith(String),
    Contains(String),
    /// Every needle must be present
    ContainsAll(Vec<String>),
    /// At least one matcher holds
    Any(Vec<Matcher>),
}

impl Matcher {
    pub fn starts_with(prefix: &str) -> Self {
        Matcher::StartsWith(prefix.to_string())
    }

    pub fn contains(needle: &str) -> Self {
        Matcher::Contains(needle.to_string())
    }

    pub fn contains_all(needles: &[&str]) -> Self {
        Matcher::ContainsAll(needles.iter().map(|n| n.to_string()).collect())
    }

    pub fn matches(&self, line: &str) -> bool {
        match self {
            Matcher::StartsWith(prefix) => line.starts_with(prefix.as_str()),
            Matcher::Contains(needle) => line.contains(needle.as_str()),
            Matcher::ContainsAll(needles) => needles.iter().all(|n| line.contains(n.as_str())),
            Matcher::Any(matchers) => matchers.iter().any(|m| m.matches(line)),
        }
    }
}

/// What a matching line means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Rest of the line after the prefix is the logical exit code
    SelfReportedExit { prefix: String },
    Transient(String),
}

/// Decisive signal extracted from one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSignal {
    ExitCode(i32),
    Retry(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierRule {
    pub matcher: Matcher,
    pub scope: StreamScope,
    pub classification: Classification,
}

impl ClassifierRule {
    pub fn transient(matcher: Matcher, reason: &str) -> Self {
        Self {
            matcher,
            scope: StreamScope::Both,
            classification: Classification::Transient(reason.to_string()),
        }
    }

    fn apply(&self, stream: OutputStream, line: &str) -> Option<LineSignal> {
        if !self.scope.accepts(stream) || !self.matcher.matches(line) {
            return None;
        }

        match &self.classification {
            Classification::Transient(reason) => Some(LineSignal::Retry(reason.clone())),
            Classification::SelfReportedExit { prefix } => {
                let raw = line.strip_prefix(prefix.as_str())?.trim();
                match raw.parse::<i32>() {
                    Ok(code) => Some(LineSignal::ExitCode(code)),
                    Err(e) => {
                        warn!(line = %line, error = %e, "Ignoring unparsable self-reported exit code");
                        None
                    }
                }
            }
        }
    }
}

/// Stateless, ordered rule set
#[derive(Debug, Clone, Default)]
pub struct OutputClassifier {
    rules: Vec<ClassifierRule>,
}

impl OutputClassifier {
    /// Empty classifier (no line is ever decisive)
    pub fn new() -> Self {
        Self::default()
    }

    /// Self-report row followed by the known transient signatures
    pub fn standard() -> Self {
        Self::new()
            .with_rule(ClassifierRule {
                matcher: Matcher::starts_with(SELF_REPORT_PREFIX),
                scope: StreamScope::StdoutOnly,
                classification: Classification::SelfReportedExit {
                    prefix: SELF_REPORT_PREFIX.to_string(),
                },
            })
            .with_rule(ClassifierRule::transient(
                Matcher::contains_all(&["err:sync:RtlpWaitForCriticalSection", "wait timed out"]),
                "wine deadlock",
            ))
            .with_rule(ClassifierRule::transient(
                Matcher::Any(vec![
                    Matcher::starts_with("X Error of failed request:"),
                    Matcher::contains("err:winediag:nodrv_CreateWindow"),
                    Matcher::contains("/libX11.so.6(XCreateIC"),
                ]),
                "X11 transient error",
            ))
    }

    /// Append a row (lowest precedence)
    pub fn with_rule(mut self, rule: ClassifierRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[ClassifierRule] {
        &self.rules
    }

    /// First matching rule decides; None means "no signal"
    pub fn classify(&self, stream: OutputStream, line: &str) -> Option<LineSignal> {
        self.rules.iter().find_map(|rule| rule.apply(stream, line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(stream: OutputStream, line: &str) -> Option<LineSignal> {
        OutputClassifier::standard().classify(stream, line)
    }

    #[test]
    fn test_self_reported_exit_code() {
        assert_eq!(
            classify(OutputStream::Stdout, "Terminating with exit code 170"),
            Some(LineSignal::ExitCode(170))
        );
        assert_eq!(
            classify(OutputStream::Stdout, "Terminating with exit code -1\r"),
            Some(LineSignal::ExitCode(-1))
        );
    }

    #[test]
    fn test_self_report_ignored_on_stderr() {
        assert_eq!(
            classify(OutputStream::Stderr, "Terminating with exit code 42"),
            None
        );
    }

    #[test]
    fn test_self_report_must_be_at_line_start() {
        assert_eq!(
            classify(OutputStream::Stdout, "[log] Terminating with exit code 42"),
            None
        );
        assert_eq!(
            classify(OutputStream::Stdout, "Terminating with exit code soon"),
            None
        );
    }

    #[test]
    fn test_wine_deadlock_needs_both_fragments() {
        let line = "0124:err:sync:RtlpWaitForCriticalSection section 7BC6 \"?\" wait timed out in thread 0124";
        assert_eq!(
            classify(OutputStream::Stderr, line),
            Some(LineSignal::Retry("wine deadlock".into()))
        );
        assert_eq!(
            classify(OutputStream::Stdout, line),
            Some(LineSignal::Retry("wine deadlock".into()))
        );
        assert_eq!(
            classify(OutputStream::Stderr, "0124:err:sync:RtlpWaitForCriticalSection section"),
            None
        );
    }

    #[test]
    fn test_x11_signatures() {
        for line in [
            "X Error of failed request:  BadWindow (invalid Window parameter)",
            "0030:err:winediag:nodrv_CreateWindow Application tried to create a window",
            "#5 /usr/lib/libX11.so.6(XCreateIC+0x2a) [0x7f]",
        ] {
            assert_eq!(
                classify(OutputStream::Stderr, line),
                Some(LineSignal::Retry("X11 transient error".into())),
                "{line}"
            );
        }
        assert_eq!(
            classify(OutputStream::Stderr, "  X Error of failed request:"),
            None
        );
    }

    #[test]
    fn test_ordinary_lines_have_no_signal() {
        assert_eq!(classify(OutputStream::Stdout, "Loading player data"), None);
        assert_eq!(classify(OutputStream::Stderr, ""), None);
    }

    #[test]
    fn test_first_match_wins_and_rules_are_additive() {
        let classifier = OutputClassifier::standard()
            .with_rule(ClassifierRule::transient(
                Matcher::contains("Terminating"),
                "never reached for self-reports",
            ))
            .with_rule(ClassifierRule::transient(
                Matcher::contains("Fatal error in GC"),
                "gc crash",
            ));

        assert_eq!(
            classifier.classify(OutputStream::Stdout, "Terminating with exit code 170"),
            Some(LineSignal::ExitCode(170))
        );
        assert_eq!(
            classifier.classify(OutputStream::Stderr, "Fatal error in GC: too many heap sections"),
            Some(LineSignal::Retry("gc crash".into()))
        );
        assert_eq!(classifier.rules().len(), 5);
    }
}
