//! `LIST` response parsing.
//!
//! Supports two formats, tried in order:
//! 1. **Unix-style** (`ls -l`): `drwxr-xr-x 2 0 0 4096 Jan 1 00:00 sub dir`
//! 2. **DOS/IIS-style**: `01-01-25  12:00AM  <DIR>  sub`
//!
//! Lines matching neither are dropped. This is a lossy best-effort parser:
//! runs of spaces inside a name collapse to one.

use fieldkit_core::RemoteEntry;

/// One server dialect. Receives the whitespace-split tokens of a line and
/// returns `(name, is_directory)` if the line is in its format.
trait ListingDialect: Sync {
    fn parse(&self, tokens: &[&str]) -> Option<(String, bool)>;
}

/// `<perms> <links> <owner> <group> <size> <mon> <day> <time|year> <name...>`
struct UnixDialect;

impl ListingDialect for UnixDialect {
    fn parse(&self, tokens: &[&str]) -> Option<(String, bool)> {
        let perms = tokens.first()?;
        let kind = perms.chars().next()?;
        if perms.chars().count() < 10 || !matches!(kind, 'd' | '-' | 'l') {
            return None;
        }
        if tokens.len() < 9 {
            return None;
        }
        Some((tokens[8..].join(" "), kind == 'd'))
    }
}

/// `<mm-dd-yy> <time> <size|<DIR>> <name...>`
struct DosDialect;

impl ListingDialect for DosDialect {
    fn parse(&self, tokens: &[&str]) -> Option<(String, bool)> {
        if tokens.len() < 4 {
            return None;
        }
        let date: Vec<char> = tokens[0].chars().collect();
        if date.len() != 8 || date[2] != '-' || date[5] != '-' {
            return None;
        }
        let is_dir = tokens[2].eq_ignore_ascii_case("<DIR>");
        Some((tokens[3..].join(" "), is_dir))
    }
}

static DIALECTS: &[&dyn ListingDialect] = &[&UnixDialect, &DosDialect];

/// Parse one listing line received for `parent_path`.
pub fn parse_line(line: &str, parent_path: &str) -> Option<RemoteEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }

    let (name, is_directory) = DIALECTS.iter().find_map(|d| d.parse(&tokens))?;
    if name.trim().is_empty() {
        return None;
    }
    Some(RemoteEntry::under(parent_path, name, is_directory))
}
