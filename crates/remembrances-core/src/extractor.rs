//! Symbol Extractor (C2, part 2): walks a tree-sitter AST and emits a
//! hierarchical symbol table (spec.md §4.2).
//!
//! Unlike the teacher's query-driven `TagExtractor` (SCM queries matched
//! against an open-ended `Container`/`Callable`/`Data` taxonomy), this
//! walker matches tree-sitter node kinds directly against a per-language
//! table and maps each hit into the spec's closed [`SymbolKind`]
//! enumeration. Nodes that aren't in the table are skipped, but their
//! children are still walked — so a function nested in an unmatched
//! wrapper node is still found.

use remembrances_storage::SymbolKind;
use tree_sitter::Node;

use crate::parser::{CodeParser, ParserError, SupportedLanguage};

/// One extracted symbol with its nested children (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct ExtractedSymbol {
    pub name: String,
    pub name_path: String,
    pub kind: SymbolKind,
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: u32,
    pub end_byte: u32,
    pub signature: String,
    pub body: String,
    pub children: Vec<ExtractedSymbol>,
}

impl ExtractedSymbol {
    /// Flatten this symbol and its descendants into a pre-order list of
    /// `(symbol, parent_name_path)` pairs, the shape the indexer persists.
    pub fn flatten(&self, parent_path: Option<&str>) -> Vec<(ExtractedSymbol, Option<String>)> {
        let mut out = vec![(self.clone_without_children(), parent_path.map(str::to_string))];
        for child in &self.children {
            out.extend(child.flatten(Some(&self.name_path)));
        }
        out
    }

    fn clone_without_children(&self) -> ExtractedSymbol {
        ExtractedSymbol {
            children: Vec::new(),
            ..self.clone()
        }
    }
}

/// One row of the per-language node-kind table: a tree-sitter node kind
/// maps to a [`SymbolKind`] when encountered while walking.
struct Rule {
    kind: &'static str,
    symbol_kind: SymbolKind,
}

const fn r(kind: &'static str, symbol_kind: SymbolKind) -> Rule {
    Rule { kind, symbol_kind }
}

fn rules_for(language: SupportedLanguage) -> &'static [Rule] {
    use SymbolKind::*;
    use SupportedLanguage as L;
    match language {
        L::Rust => &[
            r("function_item", Function),
            r("struct_item", Struct),
            r("enum_item", Enum),
            r("trait_item", Interface),
            r("impl_item", Namespace),
            r("mod_item", Module),
            r("const_item", Constant),
            r("static_item", Constant),
            r("type_item", Type),
            r("use_declaration", Import),
        ],
        L::Python => &[
            r("function_definition", Function),
            r("class_definition", Class),
            r("import_statement", Import),
            r("import_from_statement", Import),
        ],
        L::JavaScript | L::TypeScript | L::Tsx | L::Vue => &[
            r("function_declaration", Function),
            r("class_declaration", Class),
            r("method_definition", Method),
            r("interface_declaration", Interface),
            r("enum_declaration", Enum),
            r("type_alias_declaration", Type),
            r("import_statement", Import),
            r("lexical_declaration", Variable),
        ],
        L::Go => &[
            r("function_declaration", Function),
            r("method_declaration", Method),
            r("type_spec", Type),
            r("const_spec", Constant),
            r("var_spec", Variable),
            r("import_declaration", Import),
        ],
        L::Java | L::Kotlin => &[
            r("class_declaration", Class),
            r("interface_declaration", Interface),
            r("enum_declaration", Enum),
            r("method_declaration", Method),
            r("constructor_declaration", Method),
            r("function_declaration", Function),
            r("field_declaration", Property),
            r("property_declaration", Property),
            r("import_declaration", Import),
            r("object_declaration", Module),
        ],
        L::Swift => &[
            r("class_declaration", Class),
            r("protocol_declaration", Interface),
            r("struct_declaration", Struct),
            r("enum_declaration", Enum),
            r("function_declaration", Function),
            r("property_declaration", Property),
            r("import_declaration", Import),
        ],
        L::C => &[
            r("function_definition", Function),
            r("struct_specifier", Struct),
            r("enum_specifier", Enum),
            r("type_definition", Type),
            r("preproc_include", Import),
        ],
        L::Cpp => &[
            r("function_definition", Function),
            r("class_specifier", Class),
            r("struct_specifier", Struct),
            r("enum_specifier", Enum),
            r("namespace_definition", Namespace),
            r("type_definition", Type),
            r("preproc_include", Import),
        ],
        L::CSharp => &[
            r("class_declaration", Class),
            r("interface_declaration", Interface),
            r("struct_declaration", Struct),
            r("enum_declaration", Enum),
            r("method_declaration", Method),
            r("constructor_declaration", Method),
            r("property_declaration", Property),
            r("namespace_declaration", Namespace),
            r("using_directive", Import),
        ],
        L::Ruby => &[
            r("class", Class),
            r("module", Module),
            r("method", Method),
            r("singleton_method", Method),
        ],
        L::Scala => &[
            r("class_definition", Class),
            r("trait_definition", Interface),
            r("object_definition", Module),
            r("function_definition", Function),
            r("val_definition", Constant),
            r("var_definition", Variable),
            r("import_declaration", Import),
        ],
        L::Php => &[
            r("class_declaration", Class),
            r("interface_declaration", Interface),
            r("trait_declaration", Interface),
            r("method_declaration", Method),
            r("function_definition", Function),
            r("property_declaration", Property),
            r("namespace_definition", Namespace),
        ],
        L::Bash => &[r("function_definition", Function)],
        L::Markdown => &[
            r("atx_heading", Module),
            r("setext_heading", Module),
        ],
        L::Yaml => &[r("block_mapping_pair", Property)],
    }
}

/// Nodes whose name should come from a direct-text fallback rather than a
/// `name`/`type_identifier` field (imports, includes, use-declarations —
/// constructs that name a path rather than declare an identifier).
fn is_path_like(kind: &'static str) -> bool {
    matches!(
        kind,
        "use_declaration"
            | "import_declaration"
            | "import_statement"
            | "import_from_statement"
            | "preproc_include"
            | "using_directive"
    )
}

fn node_name(node: Node, source: &str) -> Option<String> {
    for field in ["name", "type_identifier", "declarator"] {
        if let Some(child) = node.child_by_field_name(field) {
            if let Ok(text) = child.utf8_text(source.as_bytes()) {
                let text = text.trim();
                if !text.is_empty() {
                    return Some(first_line(text));
                }
            }
        }
    }
    // Fall back to the first identifier-ish child.
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind().ends_with("identifier") || child.kind() == "constant" {
            if let Ok(text) = child.utf8_text(source.as_bytes()) {
                let text = text.trim();
                if !text.is_empty() {
                    return Some(first_line(text));
                }
            }
        }
    }
    None
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or(text).trim().to_string()
}

/// Derive a human-readable one-line signature: the node's source up to
/// its first `{`, `:` block opener, or newline, capped at 200 chars.
fn signature_of(text: &str) -> String {
    let cut = text
        .find('{')
        .or_else(|| text.find('\n'))
        .unwrap_or(text.len());
    let sig = text[..cut].trim();
    if sig.chars().count() > 200 {
        sig.chars().take(200).collect()
    } else {
        sig.to_string()
    }
}

/// Cap applied to a symbol's stored `source_code` (spec.md §3
/// `MaxSymbolBodyChars`, default 10 000).
pub const MAX_SYMBOL_BODY_CHARS: usize = 10_000;

fn cap_body(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// Walk `node`'s children, matching the language's rule table. Matched
/// nodes become symbols (name collisions within a scope are disambiguated
/// by appending `#<start_line>`); everything else is walked transparently
/// so nested symbols are still found.
fn walk_children(
    node: Node,
    source: &str,
    language: SupportedLanguage,
    rules: &'static [Rule],
    seen_names: &mut std::collections::HashSet<String>,
) -> Vec<ExtractedSymbol> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let kind = child.kind();
        if let Some(rule) = rules.iter().find(|r| r.kind == kind) {
            let text = child.utf8_text(source.as_bytes()).unwrap_or_default();
            let name = if is_path_like(kind) {
                first_line(text)
            } else {
                node_name(child, source).unwrap_or_else(|| format!("<anonymous:{}>", child.start_position().row + 1))
            };
            let name = disambiguate(name, child.start_position().row, seen_names);

            let mut child_seen = std::collections::HashSet::new();
            let children = walk_children(child, source, language, rules, &mut child_seen);

            out.push(ExtractedSymbol {
                name_path: name.clone(),
                name,
                kind: rule.symbol_kind,
                start_line: child.start_position().row as u32 + 1,
                end_line: child.end_position().row as u32 + 1,
                start_byte: child.start_byte() as u32,
                end_byte: child.end_byte() as u32,
                signature: signature_of(text),
                body: cap_body(text, MAX_SYMBOL_BODY_CHARS),
                children,
            });
        } else {
            out.extend(walk_children(child, source, language, rules, seen_names));
        }
    }
    out
}

fn disambiguate(name: String, line: usize, seen: &mut std::collections::HashSet<String>) -> String {
    if seen.insert(name.clone()) {
        name
    } else {
        format!("{name}#{}", line + 1)
    }
}

/// Go methods are declared with an explicit receiver (`func (s *UserService)
/// Authenticate(...)`) rather than lexically nested inside their type, so
/// the generic tree walk above emits them as top-level siblings of the
/// `type_spec` they belong to. Re-parent each method onto the type whose
/// name matches its receiver (spec.md §8 scenario 6 expects `name_path`
/// `UserService/Authenticate`, not a flat `Authenticate`).
fn nest_go_methods(root: Node, source: &str, mut symbols: Vec<ExtractedSymbol>) -> Vec<ExtractedSymbol> {
    let mut receiver_of_byte: std::collections::HashMap<u32, String> = std::collections::HashMap::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        if child.kind() == "method_declaration" {
            if let Some(ty) = go_receiver_type_name(child, source) {
                receiver_of_byte.insert(child.start_byte() as u32, ty);
            }
        }
    }
    if receiver_of_byte.is_empty() {
        return symbols;
    }

    let mut methods_by_type: std::collections::HashMap<String, Vec<ExtractedSymbol>> = std::collections::HashMap::new();
    let mut rest = Vec::with_capacity(symbols.len());
    for symbol in symbols.drain(..) {
        match receiver_of_byte.get(&symbol.start_byte) {
            Some(ty) => methods_by_type.entry(ty.clone()).or_default().push(symbol),
            None => rest.push(symbol),
        }
    }
    for symbol in rest.iter_mut() {
        if symbol.kind == SymbolKind::Type {
            if let Some(methods) = methods_by_type.remove(&symbol.name) {
                symbol.children.extend(methods);
            }
        }
    }
    // Methods whose receiver type wasn't found at top level (e.g. the type
    // lives in another file) stay flat rather than being dropped.
    for (_, leftover) in methods_by_type {
        rest.extend(leftover);
    }
    rest
}

/// Parse a Go method's receiver clause text (`"(s *UserService)"` or
/// `"(s UserService)"`) to the bare receiver type name.
fn go_receiver_type_name(node: Node, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let text = receiver.utf8_text(source.as_bytes()).ok()?;
    let inner = text.trim().trim_start_matches('(').trim_end_matches(')').trim();
    let mut parts = inner.split_whitespace();
    let _receiver_name = parts.next()?;
    let ty = parts.next()?;
    Some(ty.trim_start_matches('*').to_string())
}

/// Set every descendant's `name_path` to `parent/child`, recursively.
fn qualify(symbols: &mut [ExtractedSymbol], parent_path: Option<&str>) {
    for symbol in symbols.iter_mut() {
        symbol.name_path = match parent_path {
            Some(parent) => format!("{parent}/{}", symbol.name),
            None => symbol.name.clone(),
        };
        qualify(&mut symbol.children, Some(&symbol.name_path));
    }
}

/// Extract the hierarchical symbol table for one source file.
///
/// Determinism (spec.md §4.2): identical bytes in always yield identical
/// symbol records out, because the walk order follows tree-sitter's
/// deterministic child enumeration and no randomized collections are
/// consulted during the walk.
pub fn extract_symbols(
    language: SupportedLanguage,
    source: &str,
) -> Result<Vec<ExtractedSymbol>, ParserError> {
    // Vue SFCs have no dedicated grammar here; approximate by pulling the
    // `<script>` block and extracting it as TSX. Markdown/YAML still run
    // through their own grammars above for lightweight section/key
    // symbols per the language table.
    let (language, source_to_parse, byte_offset) = if language == SupportedLanguage::Vue {
        match extract_vue_script_block(source) {
            Some((block, offset)) => (SupportedLanguage::Tsx, block, offset),
            None => return Ok(Vec::new()),
        }
    } else {
        (language, source.to_string(), 0usize)
    };

    let mut parser = CodeParser::new(language)?;
    let tree = parser.parse(&source_to_parse)?;
    let rules = rules_for(language);
    let mut seen = std::collections::HashSet::new();
    let mut symbols = walk_children(tree.root_node(), &source_to_parse, language, rules, &mut seen);

    if language == SupportedLanguage::Go {
        symbols = nest_go_methods(tree.root_node(), &source_to_parse, symbols);
    }

    if byte_offset > 0 {
        shift_bytes(&mut symbols, byte_offset as u32);
    }

    qualify(&mut symbols, None);
    Ok(symbols)
}

fn shift_bytes(symbols: &mut [ExtractedSymbol], offset: u32) {
    for symbol in symbols.iter_mut() {
        symbol.start_byte += offset;
        symbol.end_byte += offset;
        shift_bytes(&mut symbol.children, offset);
    }
}

/// Pull the contents of the first `<script ...>...</script>` block out of
/// a `.vue` single-file component, along with its byte offset in the
/// original file (so spans still point at the right place on disk).
fn extract_vue_script_block(source: &str) -> Option<(String, usize)> {
    let open_tag_start = source.find("<script")?;
    let open_tag_end = source[open_tag_start..].find('>')? + open_tag_start + 1;
    let close_tag_start = source[open_tag_end..].find("</script>")? + open_tag_end;
    Some((source[open_tag_end..close_tag_start].to_string(), open_tag_end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_rust_struct_and_method() {
        let src = "pub struct UserService;\n\nimpl UserService {\n    pub fn authenticate(&self) -> bool { true }\n}\n";
        let symbols = extract_symbols(SupportedLanguage::Rust, src).unwrap();
        let names: Vec<_> = symbols.iter().map(|s| s.name_path.as_str()).collect();
        assert!(names.contains(&"UserService"));
        let impl_block = symbols.iter().find(|s| s.name == "UserService").unwrap();
        assert_eq!(impl_block.kind, SymbolKind::Namespace);
        assert_eq!(impl_block.children[0].name, "authenticate");
        assert_eq!(impl_block.children[0].name_path, "UserService/authenticate");
        assert_eq!(impl_block.children[0].kind, SymbolKind::Function);
    }

    #[test]
    fn nests_go_method_under_its_receiver_type() {
        let src = "package users\n\ntype UserService struct {\n\tdb string\n}\n\nfunc (s *UserService) Authenticate(token string) bool {\n\treturn token != \"\"\n}\n";
        let symbols = extract_symbols(SupportedLanguage::Go, src).unwrap();
        let names: Vec<_> = symbols.iter().map(|s| s.name_path.as_str()).collect();
        assert!(names.contains(&"UserService"));
        assert!(!names.contains(&"Authenticate"));
        let service = symbols.iter().find(|s| s.name == "UserService").unwrap();
        assert_eq!(service.kind, SymbolKind::Type);
        assert_eq!(service.children.len(), 1);
        assert_eq!(service.children[0].name, "Authenticate");
        assert_eq!(service.children[0].name_path, "UserService/Authenticate");
        assert_eq!(service.children[0].kind, SymbolKind::Method);
    }

    #[test]
    fn extraction_is_deterministic() {
        let src = "def foo():\n    pass\n\nclass Bar:\n    def baz(self):\n        pass\n";
        let a = extract_symbols(SupportedLanguage::Python, src).unwrap();
        let b = extract_symbols(SupportedLanguage::Python, src).unwrap();
        let names_a: Vec<_> = a.iter().map(|s| s.name_path.clone()).collect();
        let names_b: Vec<_> = b.iter().map(|s| s.name_path.clone()).collect();
        assert_eq!(names_a, names_b);
    }

    #[test]
    fn disambiguates_duplicate_names_in_scope() {
        let src = "function foo() {}\nfunction foo() {}\n";
        let symbols = extract_symbols(SupportedLanguage::JavaScript, src).unwrap();
        let names: Vec<_> = symbols.iter().map(|s| s.name_path.as_str()).collect();
        assert_eq!(names[0], "foo");
        assert!(names[1].starts_with("foo#"));
    }

    #[test]
    fn body_is_capped_at_max_symbol_body_chars() {
        let huge_body = "x".repeat(MAX_SYMBOL_BODY_CHARS + 500);
        let src = format!("def long_one():\n    \"\"\"{huge_body}\"\"\"\n    pass\n");
        let symbols = extract_symbols(SupportedLanguage::Python, &src).unwrap();
        assert!(symbols[0].body.chars().count() <= MAX_SYMBOL_BODY_CHARS);
    }
}
