use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// Longest stem we produce, in characters.
pub const MAX_STEM_CHARS: usize = 80;

/// Stem used when a title has nothing worth keeping.
pub const FALLBACK_STEM: &str = "untitled";

/// A canonical filename, split into the parts it is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameDescriptor {
    pub stem: String,
    /// `YYYY_MMDD`, or empty when the creation date is unknown.
    pub date_suffix: String,
}

impl FilenameDescriptor {
    pub fn file_name(&self) -> String {
        if self.date_suffix.is_empty() {
            format!("{}.md", self.stem)
        } else {
            format!("{}_{}.md", self.stem, self.date_suffix)
        }
    }
}

fn is_kept(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c,
            '\u{3040}'..='\u{309F}' // hiragana
            | '\u{30A0}'..='\u{30FF}' // katakana
            | '\u{4E00}'..='\u{9FAF}' // CJK unified ideographs
        )
}

fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '.' | ',' | ':' | ';' | '/' | '_')
}

/// Reduce a title to a filesystem-safe stem.
///
/// Characters outside the kept set are dropped, every run of separators
/// becomes one `_`, and trailing underscores are stripped. Applying it twice
/// gives the same result as applying it once.
pub fn sanitize(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut chars = 0usize;
    let mut pending_separator = false;

    for c in title.chars() {
        if is_separator(c) {
            pending_separator = true;
        } else if is_kept(c) {
            if pending_separator {
                if chars == MAX_STEM_CHARS {
                    break;
                }
                out.push('_');
                chars += 1;
                pending_separator = false;
            }
            if chars == MAX_STEM_CHARS {
                break;
            }
            out.push(c);
            chars += 1;
        }
    }

    out.truncate(out.trim_end_matches('_').len());
    out
}

pub fn date_suffix(date: NaiveDate) -> String {
    date.format("%Y_%m%d").to_string()
}

/// Derive the canonical filename for a document.
pub fn canonicalize(title: &str, create_date: Option<NaiveDate>) -> FilenameDescriptor {
    let stem = sanitize(title);
    FilenameDescriptor {
        stem: if stem.is_empty() {
            FALLBACK_STEM.to_string()
        } else {
            stem
        },
        date_suffix: create_date.map(date_suffix).unwrap_or_default(),
    }
}

/// First of `name`, `name_1`, `name_2`, … (counter before the extension)
/// that does not exist in `dir` right now.
///
/// Only a best effort: another writer may claim the name before it is used.
pub fn resolve_collision(dir: &Path, candidate: &str) -> PathBuf {
    let first = dir.join(candidate);
    if is_free(&first) {
        return first;
    }

    let (base, ext) = match candidate.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() => (base, format!(".{ext}")),
        _ => (candidate, String::new()),
    };

    let mut counter = 1u32;
    loop {
        let path = dir.join(format!("{base}_{counter}{ext}"));
        if is_free(&path) {
            return path;
        }
        counter += 1;
    }
}

fn is_free(path: &Path) -> bool {
    // An unreadable entry is treated as free; the write that follows will
    // surface the real problem.
    !matches!(path.try_exists(), Ok(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn sanitize_replaces_separators_and_drops_the_rest() {
        assert_eq!(sanitize("Hi There"), "Hi_There");
        assert_eq!(sanitize("Rust: traits, generics; etc."), "Rust_traits_generics_etc");
        assert_eq!(sanitize("a/b  c"), "a_b_c");
        assert_eq!(sanitize("What's up? (again)!"), "Whats_up_again");
        assert_eq!(sanitize("a - b"), "a_b");
        assert_eq!(sanitize(" leading"), "_leading");
    }

    #[test]
    fn sanitize_keeps_japanese_and_cjk() {
        assert_eq!(sanitize("日本語 の タイトル"), "日本語_の_タイトル");
        assert_eq!(sanitize("emoji 🚀 rocket"), "emoji_rocket");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let samples = [
            "Hi There",
            "  spaced __ out ..",
            "___",
            "x_ _y",
            "a.b,c:d;e/f_g",
            "\"Quoted\" 'title'",
            "日本語 の タイトル!",
            "",
            "trailing sep /",
        ];
        for s in samples {
            let once = sanitize(s);
            assert_eq!(sanitize(&once), once, "not idempotent for {s:?}");
        }
        let long = "word ".repeat(40);
        let once = sanitize(&long);
        assert!(once.chars().count() <= MAX_STEM_CHARS);
        assert!(!once.ends_with('_'));
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn descriptor_file_names() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert_eq!(canonicalize("Hi There", date).file_name(), "Hi_There_2024_0101.md");
        assert_eq!(canonicalize("Hi There", None).file_name(), "Hi_There.md");
        assert_eq!(canonicalize("???", date).file_name(), "untitled_2024_0101.md");
        assert_eq!(
            canonicalize("x", NaiveDate::from_ymd_opt(2023, 11, 5)).date_suffix,
            "2023_1105"
        );
    }

    #[test]
    fn collisions_get_a_counter_before_the_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let name = canonicalize("Foo", NaiveDate::from_ymd_opt(2024, 1, 1)).file_name();

        assert_eq!(resolve_collision(dir.path(), &name), dir.path().join("Foo_2024_0101.md"));

        fs::write(dir.path().join("Foo_2024_0101.md"), "").unwrap();
        assert_eq!(
            resolve_collision(dir.path(), &name),
            dir.path().join("Foo_2024_0101_1.md")
        );

        fs::write(dir.path().join("Foo_2024_0101_1.md"), "").unwrap();
        assert_eq!(
            resolve_collision(dir.path(), &name),
            dir.path().join("Foo_2024_0101_2.md")
        );
    }
}
