//! Line-oriented source normalization.
//!
//! Strips `#` and `//` comment lines, `/* */` blocks, triple-quoted
//! docstrings, `import`/`from` lines and blank lines, then trims every
//! surviving line. The transform is a regex heuristic: markers inside string
//! literals are treated as comments, and any line whose trimmed text starts
//! with `import` or `from` is dropped even when it is not an import
//! (`fromage()`, `imported = 1`).

use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    hash_line: Regex,
    slash_line: Regex,
    block: Regex,
    single_docstring: Regex,
    double_docstring: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        // Not `\s`: in multi-line mode that would let a match run across blank lines.
        hash_line: Regex::new(r"(?m)^[^\S\n]*#.*$").expect("valid regex"),
        slash_line: Regex::new(r"(?m)^[^\S\n]*//.*$").expect("valid regex"),
        block: Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"),
        single_docstring: Regex::new(r"(?s)'''.*?'''").expect("valid regex"),
        double_docstring: Regex::new(r#"(?s)""".*?""""#).expect("valid regex"),
    })
}

/// Remove comments, docstrings, import lines and blank lines from `text`.
///
/// Never fails; text without any markers only loses blank lines and
/// surrounding whitespace.
///
/// ```
/// use copyscan::normalize::normalize;
///
/// assert_eq!(normalize("# comment\nimport os\n\nprint(1)\n"), "print(1)");
/// ```
pub fn normalize(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let p = patterns();
    let text = p.hash_line.replace_all(text, "");
    let text = p.slash_line.replace_all(&text, "");
    let text = p.block.replace_all(&text, "");
    let text = p.single_docstring.replace_all(&text, "");
    let text = p.double_docstring.replace_all(&text, "");

    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_import_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_import_line(trimmed: &str) -> bool {
    trimmed.starts_with("import") || trimmed.starts_with("from")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comment_import_and_blank_lines() {
        assert_eq!(normalize("# comment\nimport os\n\nprint(1)\n"), "print(1)");
    }

    #[test]
    fn empty_and_whitespace_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n\t\n  "), "");
    }

    #[test]
    fn strips_slash_comments_with_leading_whitespace() {
        let src = "int main() {\n    // say hi\n    return 0;\n}\n";
        assert_eq!(normalize(src), "int main() {\nreturn 0;\n}");
    }

    #[test]
    fn trailing_comment_on_code_line_is_kept() {
        // Only whole-line comments match; the heuristic works per line start.
        assert_eq!(normalize("x = 1  # set x"), "x = 1  # set x");
    }

    #[test]
    fn block_comments_pair_with_nearest_close() {
        let src = "a();\n/* one\n two */\nb();\n/* three */ c();\n";
        assert_eq!(normalize(src), "a();\nb();\nc();");
    }

    #[test]
    fn inline_block_comment_removed() {
        assert_eq!(normalize("int x = /* width */ 4;"), "int x =  4;");
    }

    #[test]
    fn strips_docstrings() {
        let src = "def f():\n    \"\"\"Doc\n    more\"\"\"\n    return '''x\ny'''\n";
        assert_eq!(normalize(src), "def f():\nreturn");
    }

    #[test]
    fn drops_import_and_from_prefixes_even_for_identifiers() {
        let src = "from x import y\nimported_total = 3\nfromage()\nkeep = 1\n";
        assert_eq!(normalize(src), "keep = 1");
    }

    #[test]
    fn import_prefix_is_case_sensitive() {
        assert_eq!(normalize("Import = 2\nFROM = 3"), "Import = 2\nFROM = 3");
    }

    #[test]
    fn hash_inside_string_is_not_special_mid_line() {
        assert_eq!(normalize("s = \"#notcomment\""), "s = \"#notcomment\"");
    }

    #[test]
    fn only_comments_and_imports_yields_empty() {
        let src = "#!/usr/bin/env python\n# a\n// b\nimport sys\nfrom os import path\n/* c */\n";
        assert_eq!(normalize(src), "");
    }

    #[test]
    fn unterminated_block_comment_is_left_alone() {
        assert_eq!(normalize("a();\n/* open\nb();"), "a();\n/* open\nb();");
    }

    #[test]
    fn idempotent_on_mixed_input() {
        let inputs = [
            "# c\nimport os\nx = 1\n\n\ny = 2 /* z */\n",
            "class A {\n  /** doc */\n  void f() {} // tail\n}\n",
            "def g():\n    '''doc'''\n    return 3\n",
            "   leading\n\ttabs\t\n",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn crlf_lines_are_trimmed() {
        assert_eq!(normalize("a = 1\r\n// c\r\nb = 2\r\n"), "a = 1\nb = 2");
    }
}
