//! Parse HTTP response header lines as libcurl hands them over.

/// Status line of a response, e.g. `HTTP/1.1 404 Not Found`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub code: u32,
    pub reason: String,
}

impl StatusLine {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Parse `HTTP/<version> <code> [reason]`. HTTP/2 lines carry no reason.
    pub(crate) fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix("HTTP/")?;
        let mut parts = rest.splitn(3, ' ');
        let _version = parts.next()?;
        let code = parts.next()?.trim().parse::<u32>().ok()?;
        let reason = parts.next().unwrap_or("").trim().to_string();
        Some(StatusLine { code, reason })
    }
}

/// Head of the final response. Redirects produce several header blocks; each
/// new status line starts the head over so only the last block counts.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResponseHead {
    pub status: Option<StatusLine>,
    pub content_length: Option<u64>,
}

impl ResponseHead {
    pub(crate) fn push_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if let Some(status) = StatusLine::parse(line) {
            *self = ResponseHead {
                status: Some(status),
                content_length: None,
            };
            return;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.trim().parse::<u64>() {
                    self.content_length = Some(n);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(lines: &[&str]) -> ResponseHead {
        let mut h = ResponseHead::default();
        for l in lines {
            h.push_line(l);
        }
        h
    }

    #[test]
    fn status_and_content_length() {
        let h = head(&["HTTP/1.1 200 OK\r\n", "Content-Length: 12345\r\n", "\r\n"]);
        let status = h.status.unwrap();
        assert_eq!(status.code, 200);
        assert_eq!(status.reason, "OK");
        assert!(status.is_success());
        assert_eq!(h.content_length, Some(12345));
    }

    #[test]
    fn last_block_wins_after_redirect() {
        let h = head(&[
            "HTTP/1.1 302 Found",
            "Location: /elsewhere",
            "Content-Length: 10",
            "",
            "HTTP/1.1 200 OK",
            "",
        ]);
        assert_eq!(h.status.unwrap().code, 200);
        assert_eq!(h.content_length, None);
    }

    #[test]
    fn http2_status_without_reason() {
        let s = StatusLine::parse("HTTP/2 403").unwrap();
        assert_eq!(s.code, 403);
        assert_eq!(s.reason, "");
        assert!(!s.is_success());
    }

    #[test]
    fn multi_word_reason_kept() {
        let s = StatusLine::parse("HTTP/1.1 503 Service Unavailable").unwrap();
        assert_eq!(s.reason, "Service Unavailable");
    }

    #[test]
    fn malformed_content_length_ignored() {
        let h = head(&["HTTP/1.1 200 OK", "content-length: lots"]);
        assert_eq!(h.content_length, None);
    }
}
