//! Tree-sitter parsing (C2, part 1): language detection and a thin wrapper
//! around `tree_sitter::Parser` that the [`crate::extractor`] module walks
//! to build symbol records.
//!
//! Language detection is by file extension against a static table; an
//! unknown extension yields `None` and the caller skips the file silently
//! (spec.md §4.2).

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use thiserror::Error;
use tree_sitter::{Language, Parser, Tree};

/// Supported programming/markup languages for parsing (spec.md §4.2's
/// "at minimum" list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedLanguage {
    Go,
    TypeScript,
    Tsx,
    JavaScript,
    Python,
    Rust,
    Java,
    Kotlin,
    Swift,
    C,
    Cpp,
    CSharp,
    Ruby,
    Scala,
    Php,
    Bash,
    Markdown,
    Vue,
    Yaml,
}

impl SupportedLanguage {
    /// Canonical language name, as stored in `code_files.language` /
    /// `code_symbols.language`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Java => "java",
            Self::Kotlin => "kotlin",
            Self::Swift => "swift",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Ruby => "ruby",
            Self::Scala => "scala",
            Self::Php => "php",
            Self::Bash => "bash",
            Self::Markdown => "markdown",
            Self::Vue => "vue",
            Self::Yaml => "yaml",
        }
    }

    /// The tree-sitter grammar for this language. `Vue` has no grammar of
    /// its own here (spec.md doesn't call for a full SFC parser); its
    /// `<script>` block is re-parsed as TypeScript by the extractor, so
    /// this returns the TSX grammar as the nearest approximation.
    pub fn tree_sitter_language(&self) -> Language {
        match self {
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx | Self::Vue => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Java => tree_sitter_java::LANGUAGE.into(),
            Self::Kotlin => tree_sitter_kotlin_ng::LANGUAGE.into(),
            Self::Swift => tree_sitter_swift::LANGUAGE.into(),
            Self::C => tree_sitter_c::LANGUAGE.into(),
            Self::Cpp => tree_sitter_cpp::LANGUAGE.into(),
            Self::CSharp => tree_sitter_c_sharp::LANGUAGE.into(),
            Self::Ruby => tree_sitter_ruby::LANGUAGE.into(),
            Self::Scala => tree_sitter_scala::LANGUAGE.into(),
            Self::Php => tree_sitter_php::LANGUAGE_PHP.into(),
            Self::Bash => tree_sitter_bash::LANGUAGE.into(),
            Self::Markdown => tree_sitter_md::LANGUAGE.into(),
            Self::Yaml => tree_sitter_yaml::LANGUAGE.into(),
        }
    }

    /// Detect a language from a lowercased extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        get_extension_map().get(ext.to_lowercase().as_str()).copied()
    }

    /// Detect a language from a file path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(Self::from_extension)
    }

    pub fn all_extensions() -> &'static [&'static str] {
        &[
            "go", "ts", "tsx", "js", "mjs", "cjs", "py", "rs", "java", "kt", "kts", "swift", "c",
            "h", "cpp", "hpp", "cc", "cxx", "rb", "scala", "php", "sh", "bash", "md", "markdown",
            "vue", "yaml", "yml",
        ]
    }
}

impl std::fmt::Display for SupportedLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static EXTENSION_MAP: OnceLock<HashMap<&'static str, SupportedLanguage>> = OnceLock::new();

fn get_extension_map() -> &'static HashMap<&'static str, SupportedLanguage> {
    EXTENSION_MAP.get_or_init(|| {
        use SupportedLanguage::*;
        let mut map = HashMap::new();
        map.insert("go", Go);
        map.insert("ts", TypeScript);
        map.insert("tsx", Tsx);
        map.insert("js", JavaScript);
        map.insert("mjs", JavaScript);
        map.insert("cjs", JavaScript);
        map.insert("py", Python);
        map.insert("rs", Rust);
        map.insert("java", Java);
        map.insert("kt", Kotlin);
        map.insert("kts", Kotlin);
        map.insert("swift", Swift);
        map.insert("c", C);
        map.insert("h", C);
        map.insert("cpp", Cpp);
        map.insert("hpp", Cpp);
        map.insert("cc", Cpp);
        map.insert("cxx", Cpp);
        map.insert("cs", CSharp);
        map.insert("rb", Ruby);
        map.insert("scala", Scala);
        map.insert("php", Php);
        map.insert("sh", Bash);
        map.insert("bash", Bash);
        map.insert("md", Markdown);
        map.insert("markdown", Markdown);
        map.insert("vue", Vue);
        map.insert("yaml", Yaml);
        map.insert("yml", Yaml);
        map
    })
}

/// Errors raised while parsing a single file (spec.md §7 `ParseError`).
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("failed to set tree-sitter language: {0}")]
    LanguageSet(String),

    #[error("failed to parse source code")]
    ParseFailed,

    #[error("unsupported language for file: {0}")]
    UnsupportedLanguage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A tree-sitter parser bound to one language.
pub struct CodeParser {
    parser: Parser,
    language: SupportedLanguage,
}

impl CodeParser {
    pub fn new(language: SupportedLanguage) -> Result<Self, ParserError> {
        let mut parser = Parser::new();
        parser
            .set_language(&language.tree_sitter_language())
            .map_err(|e| ParserError::LanguageSet(e.to_string()))?;
        Ok(Self { parser, language })
    }

    pub fn for_path(path: &Path) -> Result<Self, ParserError> {
        let language = SupportedLanguage::from_path(path)
            .ok_or_else(|| ParserError::UnsupportedLanguage(path.display().to_string()))?;
        Self::new(language)
    }

    pub fn language(&self) -> SupportedLanguage {
        self.language
    }

    pub fn parse(&mut self, source: &str) -> Result<Tree, ParserError> {
        self.parser.parse(source, None).ok_or(ParserError::ParseFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn detects_language_by_extension() {
        assert_eq!(SupportedLanguage::from_extension("rs"), Some(SupportedLanguage::Rust));
        assert_eq!(SupportedLanguage::from_extension("PY"), Some(SupportedLanguage::Python));
        assert_eq!(SupportedLanguage::from_extension("unknown"), None);
    }

    #[test]
    fn detects_language_by_path() {
        let path = PathBuf::from("src/main.go");
        assert_eq!(SupportedLanguage::from_path(&path), Some(SupportedLanguage::Go));
    }

    #[test]
    fn parses_minimal_rust_source() {
        let mut parser = CodeParser::new(SupportedLanguage::Rust).unwrap();
        let tree = parser.parse("fn main() {}").unwrap();
        assert!(!tree.root_node().has_error());
    }
}
