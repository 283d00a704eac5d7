//! bookforge – command-line manuscript formatter.
//!
//! Usage:
//!   bookforge <manuscript.html|.txt> [--template ID] [--out-dir DIR]
//!             [--templates FILE] [--timeout-secs N] [--sequential]
//!             [--font KEY=PATH]...
//!   bookforge --list-templates [--templates FILE]
//!
//! Writes `<stem>.reflow.html` and `<stem>.pdf` next to the manuscript, or
//! into `--out-dir` when given. `--font` loads a TrueType face for one of the
//! font variants (`serif`, `sans-bold`, `mono-italic`, ...) so text is
//! measured with its real glyph advances.

use std::{
    env, fs,
    path::{Path, PathBuf},
    process,
    sync::Arc,
    time::Duration,
};

use book_forge::decode::decoder_for_extension;
use book_forge::fonts::{FontKey, FontManager};
use book_forge::pipeline::{FormattingPipeline, PipelineConfig};
use book_forge::registry::TemplateRegistry;
use book_forge::template::DEFAULT_TEMPLATE_ID;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut input_path: Option<PathBuf> = None;
    let mut out_dir: Option<PathBuf> = None;
    let mut template_file: Option<PathBuf> = None;
    let mut template_id = DEFAULT_TEMPLATE_ID.to_string();
    let mut config = PipelineConfig::default();
    let mut list_templates = false;
    let mut fonts = FontManager::new();
    let mut fonts_loaded = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--template" | "-t" => template_id = required_value(&args[0], arg, iter.next()),
            "--out-dir" | "-o" => {
                out_dir = Some(PathBuf::from(required_value(&args[0], arg, iter.next())))
            }
            "--templates" => {
                template_file = Some(PathBuf::from(required_value(&args[0], arg, iter.next())))
            }
            "--timeout-secs" => {
                let value = required_value(&args[0], arg, iter.next());
                match value.parse::<u64>() {
                    Ok(secs) if secs > 0 => {
                        config = config.with_engine_timeout(Duration::from_secs(secs))
                    }
                    _ => {
                        eprintln!("Error: --timeout-secs expects a positive integer, got '{value}'");
                        process::exit(1);
                    }
                }
            }
            "--sequential" => config = config.with_parallel(false),
            "--font" => {
                let value = required_value(&args[0], arg, iter.next());
                let Some((key, path)) = value.split_once('=') else {
                    eprintln!("Error: --font expects KEY=PATH, got '{value}'");
                    process::exit(1);
                };
                let key = match key.parse::<FontKey>() {
                    Ok(k) => k,
                    Err(e) => {
                        eprintln!("Error: {e}");
                        process::exit(1);
                    }
                };
                if let Err(e) = fonts.load_font_file(key, Path::new(path)) {
                    eprintln!("Error loading font '{path}': {e}");
                    process::exit(1);
                }
                fonts_loaded = true;
            }
            "--list-templates" => list_templates = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if input_path.is_some() {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                input_path = Some(PathBuf::from(path));
            }
        }
    }

    let mut registry = match TemplateRegistry::with_builtin() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: built-in templates are invalid: {e}");
            process::exit(1);
        }
    };
    if let Some(path) = &template_file {
        let json = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error reading '{}': {e}", path.display());
                process::exit(1);
            }
        };
        if let Err(e) = registry.load_json(&json) {
            eprintln!("Error loading templates from '{}': {e}", path.display());
            process::exit(1);
        }
    }

    if list_templates {
        for summary in registry.list() {
            println!("{:<16} {:<16} {}", summary.id, summary.display_name, summary.description);
        }
        return;
    }

    let input = match input_path {
        Some(p) => p,
        None => {
            eprintln!("Error: no manuscript specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    let extension = input.extension().and_then(|s| s.to_str()).unwrap_or("");
    let decoder = match decoder_for_extension(extension) {
        Some(d) => d,
        None => {
            eprintln!("Error: unsupported manuscript type '.{extension}' (expected .html, .htm or .txt)");
            process::exit(1);
        }
    };

    let source = match fs::read(&input) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error reading '{}': {e}", input.display());
            process::exit(1);
        }
    };

    let mut pipeline = FormattingPipeline::new(Arc::new(registry), config).with_decoder(decoder);
    if fonts_loaded {
        pipeline = pipeline.with_fonts(fonts);
    }
    let book = match pipeline.format(&source, &template_id) {
        Ok(book) => book,
        Err(e) => {
            eprintln!("Error formatting '{}': {e}", input.display());
            process::exit(1);
        }
    };
    if book.fell_back {
        eprintln!(
            "Warning: template '{template_id}' is not registered; used '{}'",
            book.template_id
        );
    }

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("manuscript")
        .to_string();
    let dir = out_dir.unwrap_or_else(|| {
        input
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default()
    });
    if !dir.as_os_str().is_empty() {
        if let Err(e) = fs::create_dir_all(&dir) {
            eprintln!("Error creating output directory: {e}");
            process::exit(1);
        }
    }

    let outputs = [
        (dir.join(format!("{stem}.reflow.html")), &book.reflow.bytes),
        (dir.join(format!("{stem}.pdf")), &book.paginated.bytes),
    ];
    for (path, bytes) in &outputs {
        if let Err(e) = fs::write(path, bytes) {
            eprintln!("Error writing '{}': {e}", path.display());
            process::exit(1);
        }
        eprintln!("Wrote '{}' ({} bytes)", path.display(), bytes.len());
    }
}

fn required_value(prog: &str, flag: &str, value: Option<&String>) -> String {
    match value {
        Some(v) => v.clone(),
        None => {
            eprintln!("Error: {flag} requires a value.");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    eprintln!("bookforge – manuscript formatter (book-forge)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <manuscript> [--template ID] [--out-dir DIR] [--templates FILE]");
    eprintln!("               [--font KEY=PATH]...");
    eprintln!("  {prog} --list-templates [--templates FILE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <manuscript>      .html/.htm/.xhtml or .txt/.md manuscript to format");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --template, -t    Template id (default: {DEFAULT_TEMPLATE_ID}; unknown ids fall back)");
    eprintln!("  --out-dir, -o     Output directory (default: next to the manuscript)");
    eprintln!("  --templates       JSON template source to register before formatting");
    eprintln!("  --timeout-secs    Layout engine timeout in seconds (default: 30)");
    eprintln!("  --sequential      Run the two renderers one after the other");
    eprintln!("  --font KEY=PATH   Measure a font variant with a TrueType file (repeatable;");
    eprintln!("                    KEY is serif, sans or mono, optionally -bold/-italic)");
    eprintln!("  --list-templates  Print registered templates and exit");
    eprintln!("  --help            Print this message");
}
