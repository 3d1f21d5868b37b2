//! Project composition analyzer.
//!
//! Walks a source tree, classifies every file by language, and splits each
//! file's lines into code, comments, and blanks. Results aggregate from files
//! into a directory tree that the console reporter renders hierarchically.
//!
//! Python files get a deeper, syntax-tree-based analysis (module docstring,
//! class and function counts, token-exact comment lines); Markdown files get a
//! structural scan (headings, links, images, fenced blocks, tables); every
//! other supported language goes through the generic comment-marker scanner.

use clap::{ArgAction, Parser};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::env;
use std::ffi::OsString;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use colored::*;
use glob::Pattern;
use regex::Regex;
use terminal_size::{terminal_size, Width};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Analyze a project tree and report code/comment/blank line statistics per language",
    color = clap::ColorChoice::Always
)]
struct Args {
    /// Project root to analyze.
    #[arg(default_value = ".")]
    path: String,

    /// Restrict analysis to these extensions (repeatable, e.g. -e py -e .js).
    #[arg(short = 'e', long = "ext", action = ArgAction::Append, value_name = "EXT")]
    extensions: Vec<String>,

    /// Additional directory names to ignore (repeatable).
    #[arg(short, long, action = ArgAction::Append, value_name = "DIR")]
    ignore: Vec<String>,

    /// Only print the compact summary.
    #[arg(short, long)]
    quiet: bool,

    /// Glob pattern matched against file names or root-relative paths.
    #[arg(short = 'f', long)]
    filespec: Option<String>,

    /// List all supported file extensions and exit.
    #[arg(long)]
    list_extensions: bool,
}

// ---------------------------------------------------------------------------
// Language registry
// ---------------------------------------------------------------------------

/// Comment syntax descriptor for one language family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CommentSyntax {
    single_line: &'static [&'static str],
    multi_line: &'static [(&'static str, &'static str)],
}

impl CommentSyntax {
    /// Returns the closing marker when any multi-line start marker occurs in
    /// the stripped line.
    fn multiline_start(&self, stripped: &str) -> Option<&'static str> {
        self.multi_line
            .iter()
            .find(|(start, _)| stripped.contains(start))
            .map(|(_, end)| *end)
    }

    fn is_single_line_comment(&self, stripped: &str) -> bool {
        self.single_line
            .iter()
            .any(|marker| stripped.starts_with(marker))
    }
}

const C_STYLE: CommentSyntax = CommentSyntax {
    single_line: &["//"],
    multi_line: &[("/*", "*/")],
};
const HASH_STYLE: CommentSyntax = CommentSyntax {
    single_line: &["#"],
    multi_line: &[],
};
const DASH_STYLE: CommentSyntax = CommentSyntax {
    single_line: &["--"],
    multi_line: &[],
};
const MARKUP_STYLE: CommentSyntax = CommentSyntax {
    single_line: &[],
    multi_line: &[("<!--", "-->")],
};
const CSS_STYLE: CommentSyntax = CommentSyntax {
    single_line: &[],
    multi_line: &[("/*", "*/")],
};
const NO_COMMENTS: CommentSyntax = CommentSyntax {
    single_line: &[],
    multi_line: &[],
};

/// Languages grouped by the comment syntax family they share. Languages that
/// are mapped below but appear in no group keep empty marker sets, so no line
/// of theirs is ever classified as a comment.
const SYNTAX_GROUPS: &[(&[&str], &CommentSyntax)] = &[
    (
        &[
            "JavaScript",
            "TypeScript",
            "C",
            "C++",
            "C#",
            "Java",
            "Kotlin",
            "Scala",
            "Go",
            "Rust",
            "Swift",
            "Dart",
            "PHP",
            "Groovy",
        ],
        &C_STYLE,
    ),
    (
        &[
            "Python", "Ruby", "Shell", "Bash", "Zsh", "Fish", "Perl", "R", "YAML", "TOML",
            "Elixir",
        ],
        &HASH_STYLE,
    ),
    (&["SQL", "Lua", "Haskell"], &DASH_STYLE),
    (&["HTML", "XML"], &MARKUP_STYLE),
    (&["CSS", "SCSS", "Sass", "Less"], &CSS_STYLE),
];

/// Extension (with leading dot, lowercase) to language identifier.
const EXTENSION_LANGUAGES: &[(&str, &str)] = &[
    // Python (deep analyzer)
    (".py", "Python"),
    (".pyw", "Python"),
    (".pyi", "Python"),
    // Markdown (structural scanner)
    (".md", "Markdown"),
    (".markdown", "Markdown"),
    // JavaScript / TypeScript ecosystem
    (".js", "JavaScript"),
    (".jsx", "JavaScript"),
    (".mjs", "JavaScript"),
    (".cjs", "JavaScript"),
    (".ts", "TypeScript"),
    (".tsx", "TypeScript"),
    // Web frontend
    (".html", "HTML"),
    (".htm", "HTML"),
    (".css", "CSS"),
    (".scss", "SCSS"),
    (".sass", "Sass"),
    (".less", "Less"),
    // C family
    (".c", "C"),
    (".h", "C"),
    (".cpp", "C++"),
    (".cc", "C++"),
    (".cxx", "C++"),
    (".hpp", "C++"),
    (".hh", "C++"),
    (".hxx", "C++"),
    (".cs", "C#"),
    // JVM languages
    (".java", "Java"),
    (".kt", "Kotlin"),
    (".kts", "Kotlin"),
    (".scala", "Scala"),
    (".groovy", "Groovy"),
    // Systems programming
    (".go", "Go"),
    (".rs", "Rust"),
    (".swift", "Swift"),
    // Scripting
    (".rb", "Ruby"),
    (".php", "PHP"),
    (".pl", "Perl"),
    (".lua", "Lua"),
    (".sh", "Shell"),
    (".bash", "Bash"),
    (".zsh", "Zsh"),
    (".fish", "Fish"),
    // Data & config
    (".sql", "SQL"),
    (".json", "JSON"),
    (".yaml", "YAML"),
    (".yml", "YAML"),
    (".xml", "XML"),
    (".toml", "TOML"),
    // Statistical
    (".r", "R"),
    // Apple ecosystem
    (".m", "Objective-C"),
    (".mm", "Objective-C++"),
    // Other modern languages
    (".dart", "Dart"),
    (".ex", "Elixir"),
    (".exs", "Elixir"),
    (".erl", "Erlang"),
    (".hrl", "Erlang"),
    (".hs", "Haskell"),
    (".lhs", "Haskell"),
    // Editor languages
    (".vim", "VimScript"),
    (".el", "EmacsLisp"),
    // Lisp family
    (".clj", "Clojure"),
    (".cljs", "ClojureScript"),
    (".lisp", "CommonLisp"),
    (".scm", "Scheme"),
];

const PYTHON_EXTENSIONS: &[&str] = &[".py", ".pyw", ".pyi"];
const MARKDOWN_EXTENSIONS: &[&str] = &[".md", ".markdown"];

/// The closed set of classifiers. The deep analyzers take priority over the
/// generic scanner when both could handle an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnalyzerKind {
    Python,
    Markdown,
    Generic,
}

/// Extension and comment-syntax lookup tables, built once at startup and
/// passed by reference. Lookups are O(1); the value is never mutated.
struct LanguageRegistry {
    language_by_extension: HashMap<&'static str, &'static str>,
    syntax_by_language: HashMap<&'static str, &'static CommentSyntax>,
}

impl LanguageRegistry {
    fn new() -> Self {
        let language_by_extension = EXTENSION_LANGUAGES.iter().copied().collect();
        let mut syntax_by_language = HashMap::new();
        for (languages, syntax) in SYNTAX_GROUPS {
            for language in *languages {
                syntax_by_language.insert(*language, *syntax);
            }
        }
        LanguageRegistry {
            language_by_extension,
            syntax_by_language,
        }
    }

    /// Maps an extension (leading dot, any case) to a language identifier, or
    /// "Unknown" when unmapped.
    fn language_for_extension(&self, extension: &str) -> &'static str {
        let lower = extension.to_lowercase();
        self.language_by_extension
            .get(lower.as_str())
            .copied()
            .unwrap_or("Unknown")
    }

    /// Comment syntax for a language; empty markers when none is configured.
    fn syntax_for_language(&self, language: &str) -> &'static CommentSyntax {
        self.syntax_by_language
            .get(language)
            .copied()
            .unwrap_or(&NO_COMMENTS)
    }

    /// Selects the classifier responsible for an extension, if any.
    fn analyzer_for_extension(&self, extension: &str) -> Option<AnalyzerKind> {
        let lower = extension.to_lowercase();
        if PYTHON_EXTENSIONS.contains(&lower.as_str()) {
            return Some(AnalyzerKind::Python);
        }
        if MARKDOWN_EXTENSIONS.contains(&lower.as_str()) {
            return Some(AnalyzerKind::Markdown);
        }
        if self.language_by_extension.contains_key(lower.as_str()) {
            return Some(AnalyzerKind::Generic);
        }
        None
    }

    fn supported_extensions(&self) -> BTreeSet<&'static str> {
        self.language_by_extension.keys().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// Statistics models
// ---------------------------------------------------------------------------

/// Language-specific metadata attached to a file's statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LanguageMetadata {
    Python {
        has_docstring: bool,
        classes: u64,
        functions: u64,
    },
    Markdown {
        headings_by_level: [u64; 6],
        headings: u64,
        links: u64,
        images: u64,
        code_blocks: u64,
        tables: u64,
    },
}

/// Statistics for a single analyzed file. Created once by a classifier and
/// never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
struct FileStats {
    path: PathBuf,
    total_lines: u64,
    code_lines: u64,
    comment_lines: u64,
    blank_lines: u64,
    language: String,
    metadata: Option<LanguageMetadata>,
}

impl FileStats {
    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn code_percentage(&self) -> f64 {
        safe_percentage(self.code_lines, self.total_lines)
    }

    fn comment_percentage(&self) -> f64 {
        safe_percentage(self.comment_lines, self.total_lines)
    }

    fn blank_percentage(&self) -> f64 {
        safe_percentage(self.blank_lines, self.total_lines)
    }
}

/// Recursive roll-up of Python metadata across a directory subtree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PythonSummary {
    files: u64,
    classes: u64,
    functions: u64,
    files_with_docstring: u64,
}

/// Statistics for one directory node. Aggregates are recomputed on every
/// query by recursive summation, so they always reflect current children.
#[derive(Debug, Clone, PartialEq)]
struct DirectoryStats {
    path: PathBuf,
    files: Vec<FileStats>,
    subdirectories: Vec<DirectoryStats>,
}

impl DirectoryStats {
    fn new(path: &Path) -> Self {
        DirectoryStats {
            path: path.to_path_buf(),
            files: Vec::new(),
            subdirectories: Vec::new(),
        }
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn total_files(&self) -> u64 {
        self.files.len() as u64
            + self
                .subdirectories
                .iter()
                .map(DirectoryStats::total_files)
                .sum::<u64>()
    }

    fn total_lines(&self) -> u64 {
        self.files.iter().map(|f| f.total_lines).sum::<u64>()
            + self
                .subdirectories
                .iter()
                .map(DirectoryStats::total_lines)
                .sum::<u64>()
    }

    fn total_code_lines(&self) -> u64 {
        self.files.iter().map(|f| f.code_lines).sum::<u64>()
            + self
                .subdirectories
                .iter()
                .map(DirectoryStats::total_code_lines)
                .sum::<u64>()
    }

    fn total_comment_lines(&self) -> u64 {
        self.files.iter().map(|f| f.comment_lines).sum::<u64>()
            + self
                .subdirectories
                .iter()
                .map(DirectoryStats::total_comment_lines)
                .sum::<u64>()
    }

    fn total_blank_lines(&self) -> u64 {
        self.files.iter().map(|f| f.blank_lines).sum::<u64>()
            + self
                .subdirectories
                .iter()
                .map(DirectoryStats::total_blank_lines)
                .sum::<u64>()
    }

    fn code_percentage(&self) -> f64 {
        safe_percentage(self.total_code_lines(), self.total_lines())
    }

    fn comment_percentage(&self) -> f64 {
        safe_percentage(self.total_comment_lines(), self.total_lines())
    }

    fn blank_percentage(&self) -> f64 {
        safe_percentage(self.total_blank_lines(), self.total_lines())
    }

    fn python_summary(&self) -> PythonSummary {
        let mut summary = PythonSummary::default();
        for file in &self.files {
            if let Some(LanguageMetadata::Python {
                has_docstring,
                classes,
                functions,
            }) = &file.metadata
            {
                summary.files += 1;
                summary.classes += classes;
                summary.functions += functions;
                if *has_docstring {
                    summary.files_with_docstring += 1;
                }
            }
        }
        for subdir in &self.subdirectories {
            let sub = subdir.python_summary();
            summary.files += sub.files;
            summary.classes += sub.classes;
            summary.functions += sub.functions;
            summary.files_with_docstring += sub.files_with_docstring;
        }
        summary
    }

    /// Sorts each node's direct files by total line count, largest first.
    /// `sort_by` is stable, so ties keep their encounter order.
    fn sort_files_by_size(&mut self) {
        self.files.sort_by(|a, b| b.total_lines.cmp(&a.total_lines));
        for subdir in &mut self.subdirectories {
            subdir.sort_files_by_size();
        }
    }
}

fn safe_percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

fn safe_rate(value: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        0.0
    } else {
        value as f64 / elapsed_secs
    }
}

// ---------------------------------------------------------------------------
// File reading
// ---------------------------------------------------------------------------

/// Reads a file as text. UTF-8 first; invalid UTF-8 is retried once as
/// Latin-1 (every byte maps to the same code point) before giving up.
fn read_file_text(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().iter().map(|&b| b as char).collect(),
    })
}

fn read_file_lines(path: &Path) -> io::Result<Vec<String>> {
    let text = read_file_text(path)?;
    Ok(text.lines().map(str::to_string).collect())
}

fn count_blank_lines(lines: &[String]) -> u64 {
    lines.iter().filter(|line| line.trim().is_empty()).count() as u64
}

/// Extension of a path, lowercased, with the leading dot.
fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

// ---------------------------------------------------------------------------
// Generic line classifier
// ---------------------------------------------------------------------------

/// Single forward pass over a file's lines counting comment lines for the
/// given syntax. Multi-line regions are tracked with a flag plus the active
/// closing marker; a line that opens and closes a region counts once and sets
/// no state. Nesting is not supported: the first closing marker ends the
/// region. An unterminated region consumes the rest of the file as comments.
fn count_comment_lines(lines: &[String], syntax: &CommentSyntax) -> u64 {
    let mut comment_lines = 0;
    let mut in_multiline = false;
    let mut end_marker = "";

    for line in lines {
        let stripped = line.trim();
        if stripped.is_empty() {
            continue;
        }

        if !syntax.multi_line.is_empty() {
            if in_multiline {
                comment_lines += 1;
                if stripped.contains(end_marker) {
                    in_multiline = false;
                    end_marker = "";
                }
                continue;
            }
            if let Some(end) = syntax.multiline_start(stripped) {
                comment_lines += 1;
                if !stripped.contains(end) {
                    in_multiline = true;
                    end_marker = end;
                }
                continue;
            }
        }

        if syntax.is_single_line_comment(stripped) {
            comment_lines += 1;
        }
    }

    comment_lines
}

fn analyze_generic_file(path: &Path, registry: &LanguageRegistry) -> io::Result<FileStats> {
    let language = file_extension(path)
        .map(|ext| registry.language_for_extension(&ext))
        .unwrap_or("Unknown");
    let lines = read_file_lines(path)?;
    let total_lines = lines.len() as u64;
    let blank_lines = count_blank_lines(&lines);
    let syntax = registry.syntax_for_language(language);
    let comment_lines = count_comment_lines(&lines, syntax);
    let code_lines = total_lines
        .saturating_sub(blank_lines)
        .saturating_sub(comment_lines);

    Ok(FileStats {
        path: path.to_path_buf(),
        total_lines,
        code_lines,
        comment_lines,
        blank_lines,
        language: language.to_string(),
        metadata: None,
    })
}

// ---------------------------------------------------------------------------
// Python deep analyzer
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PythonParse {
    has_docstring: bool,
    classes: u64,
    functions: u64,
    comment_rows: HashSet<usize>,
}

/// Parses Python source with tree-sitter. Returns `None` when the parser
/// cannot be configured or yields no tree at all; a tree that parses but
/// contains syntax errors keeps its (error-tolerant) comment tokens while the
/// structural metadata falls back to defaults.
fn parse_python_source(source: &str) -> Option<PythonParse> {
    let mut parser = tree_sitter::Parser::new();
    parser.set_language(tree_sitter_python::language()).ok()?;
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();

    let mut parse = PythonParse::default();

    // Module docstring: the first named statement (comments skipped) is an
    // expression statement holding a string literal.
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if child.kind() == "comment" {
            continue;
        }
        if child.kind() == "expression_statement" {
            parse.has_docstring = child
                .named_child(0)
                .map(|node| node.kind() == "string")
                .unwrap_or(false);
        }
        break;
    }

    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "class_definition" => parse.classes += 1,
            // Async functions are function_definition nodes as well.
            "function_definition" => parse.functions += 1,
            "comment" => {
                parse.comment_rows.insert(node.start_position().row);
            }
            _ => {}
        }
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                stack.push(child);
            }
        }
    }

    if root.has_error() {
        parse.has_docstring = false;
        parse.classes = 0;
        parse.functions = 0;
    }

    Some(parse)
}

/// Fallback comment heuristic when no syntax tree is available: stripped
/// lines starting with `#`.
fn count_hash_comment_lines(source: &str) -> u64 {
    source
        .lines()
        .filter(|line| line.trim_start().starts_with('#'))
        .count() as u64
}

fn analyze_python_file(path: &Path) -> io::Result<FileStats> {
    let source = read_file_text(path)?;
    let total_lines = source.lines().count() as u64;
    let blank_lines = source.lines().filter(|l| l.trim().is_empty()).count() as u64;

    let (metadata, comment_lines) = match parse_python_source(&source) {
        Some(parse) => (
            LanguageMetadata::Python {
                has_docstring: parse.has_docstring,
                classes: parse.classes,
                functions: parse.functions,
            },
            parse.comment_rows.len() as u64,
        ),
        None => (
            LanguageMetadata::Python {
                has_docstring: false,
                classes: 0,
                functions: 0,
            },
            count_hash_comment_lines(&source),
        ),
    };

    let code_lines = total_lines
        .saturating_sub(blank_lines)
        .saturating_sub(comment_lines);

    Ok(FileStats {
        path: path.to_path_buf(),
        total_lines,
        code_lines,
        comment_lines,
        blank_lines,
        language: "Python".to_string(),
        metadata: Some(metadata),
    })
}

// ---------------------------------------------------------------------------
// Markdown scanner
// ---------------------------------------------------------------------------

/// Structural Markdown scan. Markdown has no comment lines; every non-blank
/// line counts as code, and the construct counters land in the metadata.
struct MarkdownScanner {
    heading: Regex,
    image: Regex,
    link: Regex,
    table_divider: Regex,
}

impl MarkdownScanner {
    fn new() -> Self {
        MarkdownScanner {
            heading: Regex::new(r"^\s*(#{1,6})\s+").expect("hard-coded regex"),
            image: Regex::new(r"!\[[^\]]*\]\([^)]+\)").expect("hard-coded regex"),
            link: Regex::new(r"\[[^\]]+\]\([^)]+\)").expect("hard-coded regex"),
            table_divider: Regex::new(r"^\s*\|?\s*:?-+:?\s*(\|\s*:?-+:?\s*)+\|?\s*$")
                .expect("hard-coded regex"),
        }
    }

    fn analyze(&self, path: &Path) -> io::Result<FileStats> {
        let lines = read_file_lines(path)?;
        let total_lines = lines.len() as u64;
        let blank_lines = count_blank_lines(&lines);

        let mut headings_by_level = [0u64; 6];
        let mut headings = 0;
        let mut links = 0;
        let mut images = 0;
        let mut code_blocks = 0;
        let mut tables = 0;
        let mut in_fenced_code = false;

        for (i, raw) in lines.iter().enumerate() {
            let line = raw.as_str();
            let stripped = line.trim();

            // Fence lines toggle state; each opening counts one block, and
            // fenced content is invisible to the remaining counters.
            if stripped.starts_with("```") {
                if !in_fenced_code {
                    code_blocks += 1;
                    in_fenced_code = true;
                } else {
                    in_fenced_code = false;
                }
                continue;
            }
            if in_fenced_code {
                continue;
            }

            if let Some(caps) = self.heading.captures(line) {
                let level = caps[1].len();
                headings_by_level[level - 1] += 1;
                headings += 1;
            }

            images += self.image.find_iter(line).count() as u64;
            // Link matches that are the bracket part of an image are excluded.
            links += self
                .link
                .find_iter(line)
                .filter(|m| m.start() == 0 || line.as_bytes()[m.start() - 1] != b'!')
                .count() as u64;

            // Approximate table detection: a pipe-bearing line followed by a
            // divider row. Known to over- and under-count in edge cases.
            if line.contains('|')
                && i + 1 < lines.len()
                && self.table_divider.is_match(lines[i + 1].trim())
            {
                tables += 1;
            }
        }

        let code_lines = total_lines.saturating_sub(blank_lines);

        Ok(FileStats {
            path: path.to_path_buf(),
            total_lines,
            code_lines,
            comment_lines: 0,
            blank_lines,
            language: "Markdown".to_string(),
            metadata: Some(LanguageMetadata::Markdown {
                headings_by_level,
                headings,
                links,
                images,
                code_blocks,
                tables,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Scan metrics
// ---------------------------------------------------------------------------

/// Throughput counters for a scan. Progress output is throttled to one line
/// per second and can be silenced (tests inject a sink writer).
struct ScanMetrics {
    files: u64,
    lines: u64,
    started: Instant,
    last_progress: Instant,
    writer: Box<dyn Write + Send>,
    progress_enabled: bool,
}

impl ScanMetrics {
    fn with_writer(writer: Box<dyn Write + Send>, progress_enabled: bool) -> Self {
        ScanMetrics {
            files: 0,
            lines: 0,
            started: Instant::now(),
            last_progress: Instant::now(),
            writer,
            progress_enabled,
        }
    }

    fn update(&mut self, new_lines: u64) {
        self.files += 1;
        self.lines += new_lines;

        let now = Instant::now();
        if now.duration_since(self.last_progress) >= Duration::from_secs(1) {
            self.print_progress();
            self.last_progress = now;
        }
    }

    fn print_progress(&mut self) {
        if !self.progress_enabled {
            return;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let files = self.files;
        let lines = self.lines;
        let writer = &mut self.writer;
        let _ = write!(
            writer,
            "\rProcessed {} files ({:.1} files/sec) and {} lines ({:.1} lines/sec)...",
            files,
            safe_rate(files, elapsed),
            lines,
            safe_rate(lines, elapsed)
        );
        let _ = writer.flush();
    }

    fn print_summary(&mut self) {
        if !self.progress_enabled {
            return;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let files = self.files;
        let lines = self.lines;
        let writer = &mut self.writer;
        let _ = writeln!(
            writer,
            "Scanned {} files ({:.1} files/sec) and {} lines ({:.1} lines/sec) in {:.2}s",
            files.to_string().bright_yellow(),
            safe_rate(files, elapsed),
            lines.to_string().bright_yellow(),
            safe_rate(lines, elapsed),
            elapsed
        );
    }
}

// ---------------------------------------------------------------------------
// Tree walker
// ---------------------------------------------------------------------------

/// Directory names never descended into: version control, dependency caches,
/// build output, IDE metadata, temp/cache directories.
const IGNORED_DIRS: &[&str] = &[
    // Python
    "venv",
    "env",
    ".venv",
    "__pycache__",
    ".eggs",
    "build",
    "dist",
    ".pytest_cache",
    ".tox",
    ".mypy_cache",
    // Node.js
    "node_modules",
    ".npm",
    // Version control
    ".git",
    ".svn",
    ".hg",
    ".bzr",
    // IDEs
    ".idea",
    ".vscode",
    ".vs",
    ".eclipse",
    ".settings",
    // Build artifacts
    "target",
    "out",
    "bin",
    "obj",
    // Misc
    ".cache",
    "tmp",
    "temp",
    "logs",
    "coverage",
];

/// Walks a project tree and assembles the statistics tree bottom-up.
///
/// Per-file and per-directory failures are contained here: an unlistable
/// directory becomes an empty node, a failing analyzer drops its file with a
/// warning. Only the two root-level conditions (missing path, not a
/// directory) surface as errors. Symlinked directories are not followed, so
/// link cycles cannot recurse.
struct ProjectAnalyzer {
    root_path: PathBuf,
    extensions: Option<HashSet<String>>,
    ignore_dirs: HashSet<String>,
    filespec: Option<Pattern>,
    registry: LanguageRegistry,
    markdown: MarkdownScanner,
    metrics: ScanMetrics,
}

impl ProjectAnalyzer {
    fn with_metrics(
        root_path: &Path,
        extensions: Option<HashSet<String>>,
        extra_ignore_dirs: Option<HashSet<String>>,
        metrics: ScanMetrics,
    ) -> Self {
        let root_path = fs::canonicalize(root_path).unwrap_or_else(|_| root_path.to_path_buf());
        let mut ignore_dirs: HashSet<String> =
            IGNORED_DIRS.iter().map(|name| name.to_string()).collect();
        if let Some(extra) = extra_ignore_dirs {
            ignore_dirs.extend(extra);
        }
        ProjectAnalyzer {
            root_path,
            extensions,
            ignore_dirs,
            filespec: None,
            registry: LanguageRegistry::new(),
            markdown: MarkdownScanner::new(),
            metrics,
        }
    }

    fn with_filespec(mut self, pattern: Pattern) -> Self {
        self.filespec = Some(pattern);
        self
    }

    /// Analyzes the whole project. The root must exist and be a directory;
    /// everything below that is handled without aborting the run.
    fn analyze(&mut self) -> io::Result<DirectoryStats> {
        if !self.root_path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Path does not exist: {}", self.root_path.display()),
            ));
        }
        if !self.root_path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Path is not a directory: {}", self.root_path.display()),
            ));
        }

        let root = self.root_path.clone();
        let mut stats = self.analyze_directory(&root);
        stats.sort_files_by_size();
        Ok(stats)
    }

    fn analyze_directory(&mut self, dir_path: &Path) -> DirectoryStats {
        let mut stats = DirectoryStats::new(dir_path);

        let mut entries: Vec<PathBuf> = match fs::read_dir(dir_path) {
            Ok(read_dir) => read_dir
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .collect(),
            Err(err) => {
                // Unlistable directory: empty node, scan continues elsewhere.
                eprintln!("Warning: cannot list {}: {}", dir_path.display(), err);
                return stats;
            }
        };
        entries.sort();

        for entry_path in entries {
            if entry_path.is_file() {
                if self.should_analyze_file(&entry_path) {
                    if let Some(file_stats) = self.analyze_file(&entry_path) {
                        stats.files.push(file_stats);
                    }
                }
            } else if entry_path.is_dir()
                && !entry_path.is_symlink()
                && !self.should_ignore_dir(&entry_path)
            {
                let subdir_stats = self.analyze_directory(&entry_path);
                // Prune branches with nothing analyzable beneath them.
                if subdir_stats.total_files() > 0 {
                    stats.subdirectories.push(subdir_stats);
                }
            }
        }

        stats
    }

    fn should_ignore_dir(&self, dir_path: &Path) -> bool {
        let name = dir_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        name.starts_with('.') || self.ignore_dirs.contains(name)
    }

    fn should_analyze_file(&self, file_path: &Path) -> bool {
        let name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name.starts_with('.') {
            return false;
        }
        if let Some(pattern) = &self.filespec {
            if !filespec_matches(pattern, &self.root_path, file_path) {
                return false;
            }
        }
        let Some(extension) = file_extension(file_path) else {
            return false;
        };
        if let Some(allowed) = &self.extensions {
            return allowed.contains(&extension);
        }
        self.registry.analyzer_for_extension(&extension).is_some()
    }

    fn analyze_file(&mut self, file_path: &Path) -> Option<FileStats> {
        let extension = file_extension(file_path)?;
        let kind = self.registry.analyzer_for_extension(&extension)?;
        let result = match kind {
            AnalyzerKind::Python => analyze_python_file(file_path),
            AnalyzerKind::Markdown => self.markdown.analyze(file_path),
            AnalyzerKind::Generic => analyze_generic_file(file_path, &self.registry),
        };
        match result {
            Ok(file_stats) => {
                self.metrics.update(file_stats.total_lines);
                Some(file_stats)
            }
            Err(err) => {
                eprintln!(
                    "Warning: failed to analyze {}: {}",
                    file_path.display(),
                    err
                );
                None
            }
        }
    }

}

fn filespec_matches(pattern: &Pattern, root_path: &Path, file_path: &Path) -> bool {
    if file_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| pattern.matches(name))
        .unwrap_or(false)
    {
        return true;
    }

    let relative = match file_path.strip_prefix(root_path) {
        Ok(rel) => rel,
        Err(_) => return false,
    };

    let rel_str = match relative.to_str() {
        Some(s) => s.replace('\\', "/"),
        None => return false,
    };

    pattern.matches(&rel_str)
}

// ---------------------------------------------------------------------------
// Console reporter
// ---------------------------------------------------------------------------

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

fn rule_width(max: usize) -> usize {
    match terminal_size() {
        Some((Width(w), _)) => max.min(w as usize),
        None => max,
    }
}

fn render_header(project_path: &str, out: &mut String) {
    let rule = "═".repeat(rule_width(60));
    let _ = writeln!(out);
    let _ = writeln!(out, "📊 {} - Project Analysis", "codestat".bright_cyan());
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "📁 Project: {}", project_path);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out);
}

fn render_file(file_stats: &FileStats, indent: usize, out: &mut String) {
    let prefix = "  ".repeat(indent);
    let _ = writeln!(out, "{}├── 📄 {}", prefix, file_stats.file_name());
    let _ = writeln!(
        out,
        "{}│     Lines: {} | Code: {} | Comments: {} | Blank: {}",
        prefix,
        file_stats.total_lines,
        file_stats.code_lines,
        file_stats.comment_lines,
        file_stats.blank_lines
    );
    match &file_stats.metadata {
        Some(LanguageMetadata::Python {
            has_docstring,
            classes,
            functions,
        }) => {
            let docstring_icon = if *has_docstring { "✓" } else { "✗" };
            let _ = writeln!(
                out,
                "{}│     🐍 Classes: {} | Functions: {} | Docstring: {}",
                prefix, classes, functions, docstring_icon
            );
        }
        Some(LanguageMetadata::Markdown {
            headings,
            links,
            images,
            code_blocks,
            tables,
            ..
        }) => {
            let _ = writeln!(
                out,
                "{}│     📝 Headings: {} | Links: {} | Images: {} | Code blocks: {} | Tables: {}",
                prefix, headings, links, images, code_blocks, tables
            );
        }
        None => {
            let _ = writeln!(out, "{}│     Language: {}", prefix, file_stats.language);
        }
    }
    let _ = writeln!(out, "{}│", prefix);
}

fn render_directory(
    dir_stats: &DirectoryStats,
    indent: usize,
    is_last: bool,
    verbose: bool,
    out: &mut String,
) {
    let dir_info = format!(
        "({} files, {} lines)",
        dir_stats.total_files(),
        dir_stats.total_lines()
    );
    if indent == 0 {
        let _ = writeln!(out, "📁 {}/ {}", dir_stats.name(), dir_info);
    } else {
        let prefix = "  ".repeat(indent - 1);
        let connector = if is_last { "└──" } else { "├──" };
        let _ = writeln!(
            out,
            "{}{} 📁 {}/ {}",
            prefix,
            connector,
            dir_stats.name(),
            dir_info
        );
    }

    if verbose {
        for file_stats in &dir_stats.files {
            render_file(file_stats, indent, out);
        }
    }

    for (i, subdir) in dir_stats.subdirectories.iter().enumerate() {
        let is_last_subdir = i == dir_stats.subdirectories.len() - 1;
        render_directory(subdir, indent + 1, is_last_subdir, verbose, out);
    }

    if indent == 0 {
        let _ = writeln!(out);
    }
}

fn render_summary(stats: &DirectoryStats, out: &mut String) {
    let rule = "═".repeat(rule_width(60));
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "📈 {}", "Summary".blue().bold());
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Total Files: {}",
        group_thousands(stats.total_files()).bright_yellow()
    );
    let _ = writeln!(
        out,
        "Total Lines: {}",
        group_thousands(stats.total_lines()).bright_yellow()
    );
    let _ = writeln!(
        out,
        "  ├── Code: {} ({:.1}%)",
        group_thousands(stats.total_code_lines()),
        stats.code_percentage()
    );
    let _ = writeln!(
        out,
        "  ├── Comments: {} ({:.1}%)",
        group_thousands(stats.total_comment_lines()),
        stats.comment_percentage()
    );
    let _ = writeln!(
        out,
        "  └── Blank: {} ({:.1}%)",
        group_thousands(stats.total_blank_lines()),
        stats.blank_percentage()
    );
    let _ = writeln!(out);

    let python = stats.python_summary();
    if python.files > 0 {
        let _ = writeln!(out, "🐍 Python Specifics:");
        let _ = writeln!(out, "  ├── Files: {}", python.files);
        let _ = writeln!(out, "  ├── Classes: {}", python.classes);
        let _ = writeln!(out, "  ├── Functions: {}", python.functions);
        let _ = writeln!(
            out,
            "  └── Files with Docstring: {}",
            python.files_with_docstring
        );
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out);
}

fn render_compact_summary(stats: &DirectoryStats, project_path: &str, out: &mut String) {
    let rule = "─".repeat(rule_width(40));
    let _ = writeln!(out);
    let _ = writeln!(out, "📊 {} - Quick Summary", "codestat".bright_cyan());
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Project: {}", project_path);
    let _ = writeln!(
        out,
        "Files: {} | Lines: {}",
        group_thousands(stats.total_files()),
        group_thousands(stats.total_lines())
    );
    let _ = writeln!(
        out,
        "Code: {:.1}% | Comments: {:.1}% | Blank: {:.1}%",
        stats.code_percentage(),
        stats.comment_percentage(),
        stats.blank_percentage()
    );

    let python = stats.python_summary();
    if python.files > 0 {
        let _ = writeln!(
            out,
            "🐍 Python: {} files, {} classes, {} functions",
            python.files, python.classes, python.functions
        );
    }

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out);
}

fn render_report(stats: &DirectoryStats, project_path: &str, verbose: bool) -> String {
    let mut out = String::new();
    if verbose {
        render_header(project_path, &mut out);
        render_directory(stats, 0, true, true, &mut out);
        render_directory(stats, 0, true, false, &mut out);
        render_summary(stats, &mut out);
    } else {
        render_compact_summary(stats, project_path, &mut out);
    }
    out
}

fn render_extension_list(registry: &LanguageRegistry) -> String {
    let extensions = registry.supported_extensions();
    let mut out = String::new();
    let rule = "═".repeat(rule_width(40));

    let _ = writeln!(out);
    let _ = writeln!(out, "📋 Supported Extensions:");
    let _ = writeln!(out, "{}", rule);

    let categories: &[(&str, &[&str])] = &[
        ("Python", PYTHON_EXTENSIONS),
        ("Markdown", MARKDOWN_EXTENSIONS),
        (
            "JavaScript/TypeScript",
            &[".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx"],
        ),
        (
            "Web",
            &[".html", ".htm", ".css", ".scss", ".sass", ".less"],
        ),
        (
            "C/C++",
            &[".c", ".h", ".cpp", ".cc", ".cxx", ".hpp", ".hh", ".hxx"],
        ),
        ("Java/JVM", &[".java", ".kt", ".kts", ".scala", ".groovy"]),
    ];

    let mut categorized: BTreeSet<&str> = BTreeSet::new();
    for (category, exts) in categories {
        let matching: Vec<&str> = extensions
            .iter()
            .copied()
            .filter(|ext| exts.contains(ext))
            .collect();
        if !matching.is_empty() {
            let _ = writeln!(out, "\n{}:", category);
            let _ = writeln!(out, "  {}", matching.join(", "));
            categorized.extend(matching.iter().copied());
        }
    }

    let others: Vec<&str> = extensions
        .iter()
        .copied()
        .filter(|ext| !categorized.contains(ext))
        .collect();
    if !others.is_empty() {
        let _ = writeln!(out, "\nOther languages:");
        for chunk in others.chunks(6) {
            let _ = writeln!(out, "  {}", chunk.join(", "));
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Total: {} supported extensions", extensions.len());
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out);
    out
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Normalizes user-supplied extensions: leading dot added when missing,
/// lowercased. Empty input means "no filter".
fn normalize_extensions(raw: &[String]) -> Option<HashSet<String>> {
    if raw.is_empty() {
        return None;
    }
    Some(
        raw.iter()
            .map(|ext| {
                let ext = ext.to_lowercase();
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{}", ext)
                }
            })
            .collect(),
    )
}

fn main() -> io::Result<()> {
    run_with_args(env::args_os())
}

fn run_with_args<I, T>(args: I) -> io::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::parse_from(args);
    run_cli(args)
}

fn run_cli(args: Args) -> io::Result<()> {
    if args.list_extensions {
        let registry = LanguageRegistry::new();
        print!("{}", render_extension_list(&registry));
        return Ok(());
    }

    println!(
        "{} {}",
        env!("CARGO_PKG_NAME").bright_cyan().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_yellow()
    );

    let path = Path::new(&args.path);
    let extensions = normalize_extensions(&args.extensions);
    let extra_ignores = if args.ignore.is_empty() {
        None
    } else {
        Some(args.ignore.iter().cloned().collect())
    };
    let verbose = !args.quiet;

    let mut analyzer = ProjectAnalyzer::with_metrics(
        path,
        extensions,
        extra_ignores,
        ScanMetrics::with_writer(Box::new(io::stdout()), verbose),
    );
    if let Some(spec) = args.filespec.as_deref() {
        let pattern = Pattern::new(spec).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid filespec pattern '{}': {}", spec, err),
            )
        })?;
        analyzer = analyzer.with_filespec(pattern);
    }

    if verbose {
        println!("🔍 Analyzing {}...", analyzer.root_path.display());
    }

    let stats = analyzer.analyze()?;
    analyzer.metrics.print_summary();

    if stats.total_files() == 0 {
        println!("⚠️  No files analyzed.");
        println!("   Use --ext to select specific extensions, or --list-extensions to see the supported types.");
        return Ok(());
    }

    let project_path = analyzer.root_path.display().to_string();
    print!("{}", render_report(&stats, &project_path, verbose));

    Ok(())
}
