use biblio_pdf::PdfText;

use std::path::PathBuf;

fn main() {
    let path = std::env::args_os().nth(1).map(PathBuf::from);

    let Some(path) = path else {
        eprintln!("Usage: cargo run -p biblio-pdf --example extract_text -- <file.pdf>");
        std::process::exit(2);
    };

    let data = std::fs::read(&path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {e}", path.display());
        std::process::exit(1);
    });

    let pdf = PdfText::open(data).unwrap_or_else(|e| {
        eprintln!("Failed to parse PDF {}: {e}", path.display());
        std::process::exit(1);
    });

    let pages = pdf
        .pages_text(|current, total| eprintln!("reading page {current} of {total}"))
        .unwrap_or_else(|e| {
            eprintln!("Failed to extract text from {}: {e}", path.display());
            std::process::exit(1);
        });

    for (page_idx, text) in pages.iter().enumerate() {
        println!("=== Page {} ===", page_idx + 1);
        println!("{text}");
    }
}
