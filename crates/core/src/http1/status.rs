//! Status-code → reason-phrase mapping (§4.6): a fixed table drawn from the
//! IANA HTTP status registry subset the spec names. Unlisted codes
//! serialize the bare number with a blank reason.

pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        407 => "Proxy Authentication Required",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

/// Whether a redirect status updates the bound URL and signals `retry`
/// (§4.6). 301/308 always qualify; 302/303/307 only when policy allows.
pub fn is_redirect(code: u16, allow_302_303_307: bool) -> bool {
    matches!(code, 301 | 308) || (allow_302_303_307 && matches!(code, 302 | 303 | 307))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_have_fixed_reasons() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(reason_phrase(404), "Not Found");
        assert_eq!(reason_phrase(407), "Proxy Authentication Required");
    }

    #[test]
    fn unknown_codes_have_blank_reason() {
        assert_eq!(reason_phrase(499), "");
    }

    #[test]
    fn redirect_policy_gates_302_303_307() {
        assert!(is_redirect(301, false));
        assert!(!is_redirect(302, false));
        assert!(is_redirect(302, true));
        assert!(is_redirect(308, false));
    }
}
