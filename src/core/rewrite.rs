//! Text rewriting that turns a recorder's raw script into a parameterised,
//! long-running one.
//!
//! Every step is a pattern match over the recorded source, not a parse. A step
//! whose pattern is absent leaves the text untouched and reports a
//! [`ActionError::PatternMismatch`] warning instead of failing the build.

use crate::{
    error::{ActionError, Result},
    types::{ParamKind, ParameterSpec},
};
use regex::{Captures, Regex};
use std::sync::OnceLock;

const DEFAULT_SESSION_SETUP: &str = "sync_playwright()";
const DEFAULT_SESSION_VAR: &str = "playwright";
const SESSION_IMPORT: &str = "from playwright.sync_api import sync_playwright";
const IDLE_WAIT_MS: u32 = 1000;

fn page_close_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*page\d*\.close\(\)[ \t]*(?:\r?\n|$)").expect("valid regex")
    })
}

fn context_close_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?m)^([ \t]*)context\.close\(\)").expect("valid regex"))
}

fn page_assignment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(page\d*)[ \t]*=[ \t]*\w+\.new_page\(").expect("valid regex")
    })
}

/// How the rewritten script keeps its browser session alive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepAlive {
    /// No context-close statement was found; the script runs to completion
    None,
    /// Polls the recorded page handle until the browser goes away
    PageWait(String),
    /// No page handle was found; sleeps until interrupted
    Sleep,
}

impl KeepAlive {
    /// Whether the generated file needs `import time`
    pub fn needs_time_import(&self) -> bool {
        matches!(self, KeepAlive::Sleep)
    }
}

/// Session setup recovered from the recorder's own invocation wrapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetup {
    /// Context-manager expression, e.g. `sync_playwright()`
    pub expression: String,
    /// Name bound by `as`, passed as the entry function's first argument
    pub variable: String,
    /// False when the default was substituted
    pub recovered: bool,
}

impl Default for SessionSetup {
    fn default() -> Self {
        Self {
            expression: DEFAULT_SESSION_SETUP.to_string(),
            variable: DEFAULT_SESSION_VAR.to_string(),
            recovered: false,
        }
    }
}

/// Output of [`ScriptRewriter::rewrite`]
#[derive(Debug)]
pub struct RewrittenScript {
    pub source: String,
    pub keep_alive: KeepAlive,
    pub session: SessionSetup,
    pub pages_closed: usize,
    /// Soft pattern-mismatch warnings, one per skipped step
    pub warnings: Vec<ActionError>,
}

/// Rewrites recorded scripts around a named entry function
#[derive(Debug, Clone)]
pub struct ScriptRewriter {
    entry_function: String,
    entry_signature: Regex,
    invocation_block: Regex,
}

impl ScriptRewriter {
    pub fn new(entry_function: impl Into<String>) -> Result<Self> {
        let entry_function = entry_function.into();
        let entry = regex::escape(&entry_function);

        let entry_signature = Regex::new(&format!(
            r"(?m)^([ \t]*def[ \t]+{entry}[ \t]*\()([^)]*)(\))"
        ))
        .map_err(|err| ActionError::Config(format!("Invalid entry function name: {}", err)))?;

        let invocation_block = Regex::new(&format!(
            r#"(?m)(?:^[ \t]*if[ \t]+__name__[ \t]*==[ \t]*["']__main__["'][ \t]*:[ \t]*\r?\n)?^[ \t]*with[ \t]+(?P<setup>.+?)[ \t]+as[ \t]+(?P<var>[A-Za-z_]\w*)[ \t]*:[ \t]*\r?\n[ \t]+{entry}\([ \t]*(?P<arg>[A-Za-z_]\w*)[ \t]*\)[ \t]*(?:\r?\n|$)"#
        ))
        .map_err(|err| ActionError::Config(format!("Invalid entry function name: {}", err)))?;

        Ok(Self {
            entry_function,
            entry_signature,
            invocation_block,
        })
    }

    pub fn entry_function(&self) -> &str {
        &self.entry_function
    }

    /// Run the whole pipeline and assemble the final file contents.
    ///
    /// Fails only when a parameter would clash with a name the recording
    /// already uses; pattern mismatches are reported as warnings.
    pub fn rewrite(
        &self,
        raw: &str,
        description: &str,
        params: &[ParameterSpec],
    ) -> Result<RewrittenScript> {
        self.check_parameter_names(raw, params)?;
        let mut warnings = Vec::new();

        let (text, pages_closed) = strip_page_close(raw);

        let page_var = find_page_variable(&text);
        let (text, keep_alive) = insert_keep_alive(&text, page_var.as_deref());
        if keep_alive == KeepAlive::None {
            warnings.push(ActionError::PatternMismatch(
                "no `context.close()` found; the function will exit after its recorded actions"
                    .to_string(),
            ));
        }

        let (text, injected) = self.inject_parameters(&text, params);
        if !injected {
            warnings.push(ActionError::PatternMismatch(format!(
                "no `def {}(...)` found; parameters were not added to the signature",
                self.entry_function
            )));
        }

        let (text, session) = self.remove_invocation(&text);
        if !session.recovered {
            warnings.push(ActionError::PatternMismatch(format!(
                "no `with ... as ...: {}(...)` block found; using `{}`",
                self.entry_function, DEFAULT_SESSION_SETUP
            )));
        }

        let mut source = String::new();
        source.push_str(&format!("# {}\n", header_line(description)));
        if keep_alive.needs_time_import() {
            source.push_str("import time\n");
        }
        source.push_str(text.trim_end());
        source.push('\n');
        source.push_str(&self.invocation(description, params, &session));

        Ok(RewrittenScript {
            source,
            keep_alive,
            session,
            pages_closed,
            warnings,
        })
    }

    /// Parameters become arguments of the entry function next to the session
    /// variable and whatever it already declares, so none may reuse those names.
    pub fn check_parameter_names(&self, raw: &str, params: &[ParameterSpec]) -> Result<()> {
        let session_var = self
            .invocation_block
            .captures(raw)
            .map(|caps| caps["var"].to_string())
            .unwrap_or_else(|| DEFAULT_SESSION_VAR.to_string());
        let existing = self
            .entry_signature
            .captures(raw)
            .map(|caps| declared_arguments(&caps[2]))
            .unwrap_or_default();

        for param in params {
            if param.variable == session_var {
                return Err(ActionError::Validation(format!(
                    "Parameter `{}` clashes with the session variable",
                    param.variable
                )));
            }
            if existing.contains(&param.variable) {
                return Err(ActionError::Validation(format!(
                    "Parameter `{}` is already an argument of `{}`",
                    param.variable, self.entry_function
                )));
            }
        }
        Ok(())
    }

    /// Add each parameter, typed, to the entry function's signature
    pub fn inject_parameters(&self, text: &str, params: &[ParameterSpec]) -> (String, bool) {
        if !self.entry_signature.is_match(text) {
            return (text.to_string(), false);
        }
        if params.is_empty() {
            return (text.to_string(), true);
        }

        let added = params
            .iter()
            .map(|p| format!("{}: {}", p.variable, p.kind.python_type()))
            .collect::<Vec<_>>()
            .join(", ");

        let rewritten = self
            .entry_signature
            .replacen(text, 1, |caps: &Captures| {
                let existing = caps[2].trim().trim_end_matches(',').trim_end();
                let args = if existing.is_empty() {
                    added.clone()
                } else {
                    format!("{}, {}", existing, added)
                };
                format!("{}{}{}", &caps[1], args, &caps[3])
            })
            .into_owned();

        (rewritten, true)
    }

    /// Drop the recorder's own `with <setup> as <var>: run(<var>)` wrapper,
    /// keeping its setup expression for the new invocation block.
    pub fn remove_invocation(&self, text: &str) -> (String, SessionSetup) {
        let Some(caps) = self.invocation_block.captures(text) else {
            return (text.to_string(), SessionSetup::default());
        };

        let session = SessionSetup {
            expression: caps["setup"].trim().to_string(),
            variable: caps["var"].to_string(),
            recovered: true,
        };
        let cleaned = self.invocation_block.replace_all(text, "").into_owned();
        (cleaned, session)
    }

    /// The new `__main__` block: one required text flag per parameter
    pub fn invocation(
        &self,
        description: &str,
        params: &[ParameterSpec],
        session: &SessionSetup,
    ) -> String {
        let mut lines = vec![
            String::new(),
            String::new(),
            "if __name__ == \"__main__\":".to_string(),
            "    import argparse".to_string(),
        ];
        if !session.recovered {
            lines.push(format!("    {}", SESSION_IMPORT));
        }
        lines.push(format!(
            "    parser = argparse.ArgumentParser(description={})",
            python_string(&header_line(description))
        ));

        let mut call_args = vec![session.variable.clone()];
        for param in params {
            lines.push(format!(
                "    parser.add_argument({}, type=str, required=True, help={})",
                python_string(&param.flag()),
                python_string(&param.description)
            ));
            let value = format!("args.{}", param.variable);
            let converted = match param.kind {
                ParamKind::String => value,
                ParamKind::Number => format!("int({})", value),
            };
            call_args.push(format!("{}={}", param.variable, converted));
        }

        lines.push("    args = parser.parse_args()".to_string());
        lines.push(String::new());
        lines.push(format!(
            "    with {} as {}:",
            session.expression, session.variable
        ));
        lines.push(format!(
            "        {}({})",
            self.entry_function,
            call_args.join(", ")
        ));
        lines.push(String::new());

        lines.join("\n")
    }
}

/// Remove every `pageN.close()` statement
pub fn strip_page_close(text: &str) -> (String, usize) {
    let pattern = page_close_pattern();
    let count = pattern.find_iter(text).count();
    (pattern.replace_all(text, "").into_owned(), count)
}

/// First page handle created in the recording, e.g. `page` or `page1`
pub fn find_page_variable(text: &str) -> Option<String> {
    page_assignment_pattern()
        .captures(text)
        .map(|caps| caps[1].to_string())
}

/// Put an idle-wait loop in front of the first `context.close()`
pub fn insert_keep_alive(text: &str, page_var: Option<&str>) -> (String, KeepAlive) {
    let pattern = context_close_pattern();
    if !pattern.is_match(text) {
        return (text.to_string(), KeepAlive::None);
    }

    let (wait_call, keep_alive) = match page_var {
        Some(page) => (
            format!("{}.wait_for_timeout({})", page, IDLE_WAIT_MS),
            KeepAlive::PageWait(page.to_string()),
        ),
        None => (
            format!("time.sleep({})", IDLE_WAIT_MS / 1000),
            KeepAlive::Sleep,
        ),
    };

    let rewritten = pattern
        .replacen(text, 1, |caps: &Captures| {
            let indent = &caps[1];
            [
                format!("{indent}# Keep the browser open until it is closed by hand"),
                format!("{indent}while True:"),
                format!("{indent}    try:"),
                format!("{indent}        {wait_call}"),
                format!("{indent}    except Exception:"),
                format!("{indent}        break"),
                String::new(),
                format!("{indent}context.close()"),
            ]
            .join("\n")
        })
        .into_owned();

    (rewritten, keep_alive)
}

/// Argument names from a `def` parameter list, without annotations, defaults or `*`
fn declared_arguments(signature: &str) -> Vec<String> {
    signature
        .split(',')
        .filter_map(|arg| {
            let name = arg
                .split(|c| c == ':' || c == '=')
                .next()?
                .trim()
                .trim_start_matches('*')
                .trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Descriptions may span lines; the header comment may not
fn header_line(description: &str) -> String {
    description.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn python_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDED: &str = r#"import re
from playwright.sync_api import Playwright, sync_playwright, expect


def run(playwright: Playwright) -> None:
    browser = playwright.chromium.launch(headless=False)
    context = browser.new_context()
    page = context.new_page()
    page.goto("https://www.youtube.com/")
    page.get_by_placeholder("Search").fill("cats")
    page.close()

    # ---------------------
    context.close()
    browser.close()


with sync_playwright() as playwright:
    run(playwright)
"#;

    fn rewriter() -> ScriptRewriter {
        ScriptRewriter::new("run").unwrap()
    }

    #[test]
    fn test_strip_page_close() {
        let (text, count) = strip_page_close("    page.close()\n    page2.close()\n    x = 1\n");
        assert_eq!(count, 2);
        assert_eq!(text, "    x = 1\n");

        let (text, count) = strip_page_close("    pages.close()\n");
        assert_eq!(count, 0);
        assert_eq!(text, "    pages.close()\n");
    }

    #[test]
    fn test_keep_alive_uses_recorded_page() {
        let (text, keep_alive) = insert_keep_alive(
            "    context.close()\n    context.close()\n",
            Some("page1"),
        );
        assert_eq!(keep_alive, KeepAlive::PageWait("page1".to_string()));
        assert!(text.contains("    while True:\n        try:\n            page1.wait_for_timeout(1000)"));
        assert!(text.contains("        except Exception:\n            break"));
        // only the first close gets the loop
        assert_eq!(text.matches("while True").count(), 1);
        assert_eq!(text.matches("context.close()").count(), 2);
    }

    #[test]
    fn test_keep_alive_without_page_sleeps() {
        let (text, keep_alive) = insert_keep_alive("context.close()\n", None);
        assert_eq!(keep_alive, KeepAlive::Sleep);
        assert!(keep_alive.needs_time_import());
        assert!(text.contains("time.sleep(1)"));
    }

    #[test]
    fn test_keep_alive_missing_close() {
        let (text, keep_alive) = insert_keep_alive("browser.close()\n", Some("page"));
        assert_eq!(keep_alive, KeepAlive::None);
        assert_eq!(text, "browser.close()\n");
    }

    #[test]
    fn test_inject_parameters_in_order() {
        let params = vec![
            ParameterSpec::string("query", "words"),
            ParameterSpec::number("limit", "count"),
        ];
        let (text, injected) =
            rewriter().inject_parameters("def run(playwright: Playwright) -> None:\n", &params);
        assert!(injected);
        assert_eq!(
            text,
            "def run(playwright: Playwright, query: str, limit: int) -> None:\n"
        );

        let (text, _) = rewriter().inject_parameters("def run():\n", &params[..1]);
        assert_eq!(text, "def run(query: str):\n");
    }

    #[test]
    fn test_inject_parameters_only_touches_entry() {
        let params = vec![ParameterSpec::string("q", "query")];
        let source = "def run_twice(x):\n    pass\n\ndef run(session):\n    pass\n";
        let (text, injected) = rewriter().inject_parameters(source, &params);
        assert!(injected);
        assert!(text.contains("def run_twice(x):"));
        assert!(text.contains("def run(session, q: str):"));

        let (_, injected) = rewriter().inject_parameters("def main(session):\n", &params);
        assert!(!injected);
    }

    #[test]
    fn test_remove_invocation_keeps_setup() {
        let (text, session) = rewriter().remove_invocation(RECORDED);
        assert!(session.recovered);
        assert_eq!(session.expression, "sync_playwright()");
        assert_eq!(session.variable, "playwright");
        assert!(!text.contains("with sync_playwright() as playwright:"));
        assert!(text.contains("def run(playwright: Playwright)"));
    }

    #[test]
    fn test_remove_invocation_inside_main_guard() {
        let source = "def run(s):\n    pass\n\nif __name__ == '__main__':\n    with sync_playwright() as s:\n        run(s)\n";
        let (text, session) = rewriter().remove_invocation(source);
        assert!(session.recovered);
        assert_eq!(text, "def run(s):\n    pass\n\n");
    }

    #[test]
    fn test_full_rewrite() {
        let params = vec![ParameterSpec::string("query", "what to search")];
        let script = rewriter()
            .rewrite(RECORDED, "searches\nyoutube", &params)
            .unwrap();

        assert!(script.warnings.is_empty(), "{:?}", script.warnings);
        assert_eq!(script.pages_closed, 1);
        assert!(script.source.starts_with("# searches youtube\nimport re\n"));
        assert!(!script.source.contains("import time"));
        assert!(!script.source.contains("page.close()"));
        assert!(script
            .source
            .contains("def run(playwright: Playwright, query: str) -> None:"));
        assert!(script.source.contains(
            r#"parser.add_argument("--query", type=str, required=True, help="what to search")"#
        ));
        assert!(script
            .source
            .contains("    with sync_playwright() as playwright:\n        run(playwright, query=args.query)\n"));
        assert!(!script.source.contains(SESSION_IMPORT));
    }

    #[test]
    fn test_rewrite_reports_every_mismatch() {
        let script = rewriter().rewrite("print('hi')\n", "says hi", &[]).unwrap();
        assert_eq!(script.warnings.len(), 3);
        assert!(script
            .warnings
            .iter()
            .all(|w| w.error_code() == "BUILD_PATTERN_MISMATCH"));
        assert!(script.source.contains(SESSION_IMPORT));
        assert!(script.source.contains("        run(playwright)\n"));
    }

    #[test]
    fn test_declared_arguments() {
        assert_eq!(
            declared_arguments("playwright: Playwright, *args, limit=3, **kw"),
            vec!["playwright", "args", "limit", "kw"]
        );
        assert!(declared_arguments(" ").is_empty());
    }

    #[test]
    fn test_parameter_name_clashes() {
        let clash = rewriter()
            .rewrite(RECORDED, "d", &[ParameterSpec::string("playwright", "x")])
            .unwrap_err();
        assert_eq!(clash.error_code(), "VALIDATION_ERROR");

        let source = "def run(session, page_url):\n    pass\n\nwith sync_playwright() as p:\n    run(p)\n";
        let err = rewriter()
            .check_parameter_names(source, &[ParameterSpec::string("page_url", "x")])
            .unwrap_err();
        assert!(err.to_string().contains("already an argument"));
        let err = rewriter()
            .check_parameter_names(source, &[ParameterSpec::string("p", "x")])
            .unwrap_err();
        assert!(err.to_string().contains("session variable"));
        assert!(rewriter()
            .check_parameter_names(source, &[ParameterSpec::string("query", "x")])
            .is_ok());
    }

    #[test]
    fn test_number_arguments_are_converted() {
        let params = vec![ParameterSpec::number("limit", "say \"how many\"")];
        let block = rewriter().invocation("d", &params, &SessionSetup::default());
        assert!(block.contains(r#"help="say \"how many\"""#));
        assert!(block.contains("run(playwright, limit=int(args.limit))"));
    }

    #[test]
    fn test_python_string_escaping() {
        assert_eq!(python_string("a\\b\"c\nd"), r#""a\\b\"c\nd""#);
        assert_eq!(python_string("검색"), "\"검색\"");
    }
}
