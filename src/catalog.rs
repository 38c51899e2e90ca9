//! Fixed reference lists consulted by the analyzers.
//!
//! Everything here is immutable data baked into the binary; the analyzers only
//! ever borrow it.

/// TLD suffixes abused far more often than they are used legitimately.
/// Order matters: the first matching suffix is the one reported.
pub const SUSPICIOUS_TLDS: &[&str] = &[
    ".zip", ".mov", ".tk", ".ml", ".ga", ".cf", ".gq", ".xyz", ".top",
];

/// Lure words looked for anywhere in host, path and query.
pub const LURE_KEYWORDS: &[&str] = &[
    "login", "signin", "verify", "account", "bank", "secure", "update", "confirm",
    "password", "wallet", "billing", "suspend",
];

/// Path endings that usually mean a payload download rather than a page.
pub const SUSPICIOUS_EXTENSIONS: &[&str] = &[".exe", ".zip", ".rar", ".scr", ".js"];

/// Hostname tokens of large platforms whose subdomains would otherwise trip
/// the domain intelligence checks.
pub const TRUSTED_BRAND_TOKENS: &[&str] = &[
    "google",
    "microsoft",
    "apple",
    "amazon",
    "github",
    "cloudflare",
    "akamai",
    "office365",
];

/// Domains attackers most often imitate.
pub const LEGITIMATE_DOMAINS: &[&str] = &[
    "google.com",
    "bing.com",
    "yahoo.com",
    "duckduckgo.com",
    "gmail.com",
    "outlook.com",
    "hotmail.com",
    "proton.me",
    "icloud.com",
    "amazon.com",
    "aws.amazon.com",
    "azure.com",
    "microsoft.com",
    "cloudflare.com",
    "digitalocean.com",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "tiktok.com",
    "snapchat.com",
    "paypal.com",
    "stripe.com",
    "visa.com",
    "mastercard.com",
    "americanexpress.com",
    "bankofamerica.com",
    "chase.com",
    "wellsfargo.com",
    "amazon.in",
    "ebay.com",
    "aliexpress.com",
    "flipkart.com",
    "github.com",
    "gitlab.com",
    "bitbucket.org",
    "salesforce.com",
    "slack.com",
    "zoom.us",
    "dropbox.com",
    "gov.in",
    "uidai.gov.in",
    "irs.gov",
    "gov.uk",
    "harvard.edu",
    "stanford.edu",
    "mit.edu",
];

/// Phrases that show up in credential-harvesting page copy.
pub const PHISHING_PHRASES: &[&str] = &[
    "verify",
    "account suspended",
    "update your account",
    "confirm identity",
    "security alert",
    "unusual activity",
    "login to continue",
    "banking verification",
];

/// Cipher suite fragments that indicate a broken or obsolete primitive.
pub const WEAK_CIPHER_MARKERS: &[&str] = &["RC4", "DES", "3DES", "MD5"];

/// Protocol versions considered weak when negotiated.
pub const WEAK_PROTOCOLS: &[&str] = &["SSLv3", "TLSv1", "TLSv1.1"];

/// Registry WHOIS servers by TLD. Anything missing goes to IANA first.
pub const WHOIS_SERVERS: &[(&str, &str)] = &[
    ("com", "whois.verisign-grs.com"),
    ("net", "whois.verisign-grs.com"),
    ("org", "whois.pir.org"),
    ("info", "whois.afilias.net"),
    ("biz", "whois.neulevel.biz"),
    ("us", "whois.nic.us"),
    ("co", "whois.nic.co"),
    ("io", "whois.nic.io"),
    ("me", "whois.nic.me"),
    ("uk", "whois.nic.uk"),
    ("ca", "whois.cira.ca"),
    ("de", "whois.denic.de"),
    ("fr", "whois.afnic.fr"),
    ("ru", "whois.tcinet.ru"),
    ("jp", "whois.jprs.jp"),
    ("au", "whois.auda.org.au"),
    ("br", "whois.registro.br"),
    ("xyz", "whois.nic.xyz"),
    ("top", "whois.nic.top"),
    ("app", "whois.nic.google"),
    ("dev", "whois.nic.google"),
];

pub const IANA_WHOIS: &str = "whois.iana.org";
