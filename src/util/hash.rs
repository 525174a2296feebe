//! Fingerprints of resolved configuration files.

use sha2::{Digest, Sha256};

/// A hasher for building fingerprints from multiple components.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    /// Add a string component to the fingerprint.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0");
        self
    }

    /// Add an optional string component.
    pub fn update_opt(&mut self, opt: Option<&str>) -> &mut Self {
        match opt {
            Some(s) => {
                self.hasher.update(b"\x01");
                self.update_str(s);
            }
            None => {
                self.hasher.update(b"\x00");
            }
        }
        self
    }

    /// Finalize and return the fingerprint as a hex string.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// Finalize and return a short fingerprint (first 16 chars).
    pub fn finish_short(self) -> String {
        self.finish()[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        let mut fp = Fingerprint::new();
        fp.update_str("hello");
        assert_eq!(fp.finish().len(), 64);

        let mut a = Fingerprint::new();
        a.update_str("makefile.include.linux_gnu").update_opt(None);
        let mut b = Fingerprint::new();
        b.update_str("makefile.include.linux_gnu").update_opt(None);
        assert_eq!(a.finish_short(), b.finish_short());
    }

    #[test]
    fn test_fingerprint_separates_components() {
        let build = |parts: &[Option<&str>]| {
            let mut fp = Fingerprint::new();
            for part in parts {
                fp.update_opt(*part);
            }
            fp.finish_short()
        };

        assert_eq!(build(&[Some("gnu"), None]), build(&[Some("gnu"), None]));
        assert_ne!(build(&[Some("gnu"), None]), build(&[None, Some("gnu")]));
        assert_ne!(build(&[Some("ab"), Some("c")]), build(&[Some("a"), Some("bc")]));
        assert_eq!(build(&[]).len(), 16);
    }
}
