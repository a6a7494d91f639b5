use std::path::Path;

/// Language name inferred from a file extension, `"unknown"` otherwise.
pub fn detect_language(path: impl AsRef<Path>) -> &'static str {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "cs" => "csharp",
        "go" => "go",
        "rs" => "rust",
        "php" => "php",
        "rb" => "ruby",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "md" => "markdown",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "xml" => "xml",
        "sql" => "sql",
        "sh" => "shell",
        "bat" => "batch",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions() {
        assert_eq!(detect_language("src/main.rs"), "rust");
        assert_eq!(detect_language("a/b/c.PY"), "python");
        assert_eq!(detect_language("ci.yml"), "yaml");
        assert_eq!(detect_language("ci.yaml"), "yaml");
        assert_eq!(detect_language("run.bat"), "batch");
    }

    #[test]
    fn unknown_or_missing_extension() {
        assert_eq!(detect_language("Makefile"), "unknown");
        assert_eq!(detect_language("notes.txt"), "unknown");
        assert_eq!(detect_language(".hidden"), "unknown");
    }
}
