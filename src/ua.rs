//! Small user-agent classifier for the device gate.
//!
//! Only the coarse OS/browser/device names are needed for allow/deny list
//! matching, so this stays a heuristic string scan rather than a full parser.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub os: String,
    pub browser: String,
    pub device: String,
}

pub fn parse_user_agent(user_agent: &str) -> ClientInfo {
    ClientInfo {
        os: detect_os(user_agent),
        browser: detect_browser(user_agent),
        device: detect_device(user_agent),
    }
}

fn detect_os(ua: &str) -> String {
    let os = if ua.contains("Windows NT") {
        "Windows"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iOS") {
        "iOS"
    } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
        "macOS"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        "Unknown"
    };
    os.to_string()
}

fn detect_browser(ua: &str) -> String {
    let browser = if ua.contains("Edg/") {
        "Edge"
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        "Opera"
    } else if ua.contains("Chrome/") {
        "Chrome"
    } else if ua.contains("Firefox/") {
        "Firefox"
    } else if ua.contains("Safari/") {
        "Safari"
    } else if ua.starts_with("curl/") {
        "curl"
    } else {
        "Unknown"
    };
    browser.to_string()
}

fn detect_device(ua: &str) -> String {
    let device = if ua.contains("iPad") || ua.contains("Tablet") {
        "Tablet"
    } else if ua.contains("Mobile") || ua.contains("iPhone") || ua.contains("Android") {
        "Mobile"
    } else {
        "Desktop"
    };
    device.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    #[test]
    fn test_chrome_on_windows() {
        let info = parse_user_agent(CHROME_WINDOWS);
        assert_eq!(info.os, "Windows");
        assert_eq!(info.browser, "Chrome");
        assert_eq!(info.device, "Desktop");
    }

    #[test]
    fn test_safari_on_iphone() {
        let info = parse_user_agent(SAFARI_IPHONE);
        assert_eq!(info.os, "iOS");
        assert_eq!(info.browser, "Safari");
        assert_eq!(info.device, "Mobile");
    }

    #[test]
    fn test_unknown_agent() {
        let info = parse_user_agent("weird-bot");
        assert_eq!(info.os, "Unknown");
        assert_eq!(info.browser, "Unknown");
        assert_eq!(info.device, "Desktop");
    }
}
