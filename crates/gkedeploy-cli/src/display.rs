//! Verbose dumps of template data and rendered manifests
//!
//! Each dump is framed by `---START <caption>---` and `---END <caption>---`
//! lines so it can be picked out of CI logs.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use console::style;
use serde::Serialize;

pub const VARIABLES_CAPTION: &str = "VARIABLES AVAILABLE FOR ALL TEMPLATES";
pub const SECRETS_CAPTION: &str = "ADDITIONAL SECRET VARIABLES AVAILABLE FOR .sec.yml TEMPLATES";
pub const MANIFEST_CAPTION: &str = "RENDERED MANIFEST (Secret Manifest Omitted)";

fn start(w: &mut dyn Write, caption: &str) -> io::Result<()> {
    writeln!(w)?;
    writeln!(w, "{}", style(format!("---START {}---", caption)).cyan().bold())
}

fn end(w: &mut dyn Write, caption: &str) -> io::Result<()> {
    writeln!(w, "{}", style(format!("---END {}---", caption)).cyan().bold())
}

/// Dump `data` as pretty JSON
pub fn dump_data<T: Serialize + ?Sized>(
    w: &mut dyn Write,
    caption: &str,
    data: &T,
) -> io::Result<()> {
    start(w, caption)?;
    match serde_json::to_string_pretty(data) {
        Ok(json) => writeln!(w, "{}", json)?,
        Err(e) => writeln!(w, "error marshalling: {}", e)?,
    }
    end(w, caption)
}

/// Dump the contents of a file
pub fn dump_file(w: &mut dyn Write, caption: &str, path: &Path) -> io::Result<()> {
    start(w, caption)?;
    match fs::read_to_string(path) {
        Ok(contents) => writeln!(w, "{}", contents)?,
        Err(e) => writeln!(w, "error reading file: {}", e)?,
    }
    end(w, caption)
}
