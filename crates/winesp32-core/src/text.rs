//! Bounded string helpers shared by the settings record and transfer session.

use heapless::String;

/// Copy `source` into a fixed-capacity string, cutting at the last UTF-8
/// boundary that fits.
pub fn bounded<const N: usize>(source: &str) -> String<N> {
    let mut out = String::new();
    for ch in source.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Final `/`-separated segment of a path.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join a directory and a leaf name with exactly one separator.
pub fn join_path<const N: usize>(dir: &str, name: &str) -> Option<String<N>> {
    let mut out = String::new();
    let dir = dir.trim_end_matches('/');
    if !dir.is_empty() {
        out.push_str(dir).ok()?;
        out.push('/').ok()?;
    }
    out.push_str(name).ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_cuts_on_char_boundary() {
        let s: String<4> = bounded("aé€x");
        assert_eq!(s.as_str(), "aé");
        let s: String<8> = bounded("short");
        assert_eq!(s.as_str(), "short");
    }

    #[test]
    fn file_name_takes_last_segment() {
        assert_eq!(file_name("/sd/pics/cat.bmp"), "cat.bmp");
        assert_eq!(file_name("plain.txt"), "plain.txt");
        assert_eq!(file_name("dir/"), "");
    }

    #[test]
    fn join_path_normalizes_trailing_slash() {
        let joined: String<32> = join_path("RECV/", "a.bin").unwrap();
        assert_eq!(joined.as_str(), "RECV/a.bin");
        let joined: String<32> = join_path("", "a.bin").unwrap();
        assert_eq!(joined.as_str(), "a.bin");
        assert!(join_path::<4>("RECV", "a.bin").is_none());
    }
}
