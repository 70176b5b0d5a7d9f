use std::sync::LazyLock;

use regex::Regex;

// A decorator application such as `@conveyor.job(...)`, possibly spanning
// lines until its parentheses balance.
static DECORATOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*@conveyor[\w.]*\s*(\(.*)?$").unwrap());

/// Remove remote-execution decorator applications from a script before it
/// is staged. The backend invokes the entry point directly, so the local
/// `@conveyor...` markers must not survive into the uploaded copy.
///
/// Purely textual: lines forming a marker application are dropped, all
/// other lines pass through untouched. Scripts without markers come back
/// unchanged.
pub fn strip_decorators(source: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut lines = source.lines();

    while let Some(line) = lines.next() {
        if !DECORATOR_PATTERN.is_match(line) {
            kept.push(line);
            continue;
        }
        // Consume continuation lines until the argument list closes.
        let mut balance = paren_balance(line);
        while balance > 0 {
            let Some(next) = lines.next() else {
                break;
            };
            balance += paren_balance(next);
        }
    }

    let mut result = kept.join("\n");
    if source.ends_with('\n') && !result.is_empty() {
        result.push('\n');
    }
    result
}

fn paren_balance(line: &str) -> i32 {
    let mut balance = 0;
    for ch in line.chars() {
        match ch {
            '(' => balance += 1,
            ')' => balance -= 1,
            _ => {}
        }
    }
    balance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_line_decorator() {
        let source = "@conveyor.job(name=\"train\")\ndef main():\n    pass\n";
        assert_eq!(strip_decorators(source), "def main():\n    pass\n");
    }

    #[test]
    fn strips_multi_line_decorator() {
        let source = "\
import conveyor

@conveyor.job(
    name=\"train\",
    gpu=1,
)
def main():
    pass
";
        assert_eq!(
            strip_decorators(source),
            "import conveyor\n\ndef main():\n    pass\n"
        );
    }

    #[test]
    fn strips_bare_decorator() {
        let source = "@conveyor\ndef main():\n    pass\n";
        assert_eq!(strip_decorators(source), "def main():\n    pass\n");
    }

    #[test]
    fn keeps_unrelated_decorators() {
        let source = "@staticmethod\ndef helper():\n    pass\n";
        assert_eq!(strip_decorators(source), source);
    }

    #[test]
    fn no_op_without_markers() {
        let source = "def main():\n    return compute(1, (2 + 3))\n";
        assert_eq!(strip_decorators(source), source);
    }

    #[test]
    fn indented_decorator_inside_class() {
        let source = "\
class Runner:
    @conveyor.task(retries=2)
    def step(self):
        pass
";
        assert_eq!(
            strip_decorators(source),
            "class Runner:\n    def step(self):\n        pass\n"
        );
    }
}
