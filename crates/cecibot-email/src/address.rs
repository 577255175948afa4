//! Sender-address validation and rate-limit identity derivation.
//!
//! Providers on the whitelist get mailbox-level identities with their
//! aliasing tricks folded away: the `+tag` suffix is stripped and `.` is
//! removed from the local part, because GMail (and friends) deliver
//! `a.b+x@gmail.com` and `ab@gmail.com` to the same mailbox. Domains *not*
//! on the list are likely disposable-address services, so the whole domain
//! shares one identity and cools down collectively.

use cecibot_types::Identity;

// Do NOT add ANY domains of the following e-mail service providers (as they
// seem fishy...):
//
// - Mail.com
// - Runbox
const WHITELISTED_DOMAINS: &[&str] = &[
    "aol.com",
    //
    "hotmail.com",
    "outlook.com",
    //
    "gmail.com",
    "googlemail.com",
    //
    "tutanota.com",
    "tutanota.de",
    "tutamail.com",
    "tuta.io",
    "keemail.me",
    //
    "protonmail.com",
    "protonmail.ch",
    //
    "icloud.com",
    "me.com",
    "mac.com",
    //
    "rediffmail.com",
    //
    "yahoo.com",
    //
    "yandex.com",
    "yandex.ru",
    //
    "mail.ru",
    //
    "zoho.com",
    "zoho.eu",
    //
    "hushmail.com",
    "hushmail.me",
    "hush.com",
    "hush.ai",
    "mac.hush.com",
    //
    "fastmail.com",
    "fastmail.cn",
    "fastmail.co.uk",
    "fastmail.com.au",
    "fastmail.de",
    "fastmail.es",
    "fastmail.fm",
    "fastmail.fr",
    "fastmail.im",
    "fastmail.in",
    "fastmail.jp",
    "fastmail.mx",
    "fastmail.net",
    "fastmail.nl",
    "fastmail.org",
    "fastmail.se",
    "fastmail.to",
    "fastmail.tw",
    "fastmail.uk",
    "fastmail.us",
    "123mail.org",
    "airpost.net",
    "eml.cc",
    "fmail.co.uk",
    "fmgirl.com",
    "fmguy.com",
    "mailbolt.com",
    "mailcan.com",
    "mailhaven.com",
    "mailmight.com",
    "ml1.net",
    "mm.st",
    "myfastmail.com",
    "proinbox.com",
    "promessage.com",
    "rushpost.com",
    "sent.as",
    "sent.at",
    "sent.com",
    "speedymail.org",
    "warpmail.net",
    "xsmail.com",
    "150mail.com",
    "150ml.com",
    "16mail.com",
    "2-mail.com",
    "4email.net",
    "50mail.com",
    "allmail.net",
    "bestmail.us",
    "cluemail.com",
    "elitemail.org",
    "emailcorner.net",
    "emailengine.net",
    "emailengine.org",
    "emailgroups.net",
    "emailplus.org",
    "emailuser.net",
    "f-m.fm",
    "fast-email.com",
    "fast-mail.org",
    "fastem.com",
    "fastemail.us",
    "fastemailer.com",
    "fastest.cc",
    "fastimap.com",
    "fastmailbox.net",
    "fastmessaging.com",
    "fea.st",
    "fmailbox.com",
    "ftml.net",
    "h-mail.us",
    "hailmail.net",
    "imap-mail.com",
    "imap.cc",
    "imapmail.org",
    "inoutbox.com",
    "internet-e-mail.com",
    "internet-mail.org",
    "internetemails.net",
    "internetmailing.net",
    "jetemail.net",
    "justemail.net",
    "letterboxes.org",
    "mail-central.com",
    "mail-page.com",
    "mailandftp.com",
    "mailas.com",
    "mailc.net",
    "mailforce.net",
    "mailftp.com",
    "mailingaddress.org",
    "mailite.com",
    "mailnew.com",
    "mailsent.net",
    "mailservice.ms",
    "mailup.net",
    "mailworks.org",
    "mymacmail.com",
    "nospammail.net",
    "ownmail.net",
    "petml.com",
    "postinbox.com",
    "postpro.net",
    "realemail.net",
    "reallyfast.biz",
    "reallyfast.info",
    "speedpost.net",
    "ssl-mail.com",
    "swift-mail.com",
    "the-fastest.net",
    "the-quickest.com",
    "theinternetemail.com",
    "veryfast.biz",
    "veryspeedy.net",
    "yepmail.net",
    "your-mail.com",
];

/// Splits `local@domain`, requiring exactly one `@`.
fn separate(address: &str) -> Option<(&str, &str)> {
    let mut parts = address.split('@');
    let local = parts.next()?;
    let domain = parts.next()?;
    if parts.next().is_some() || local.is_empty() || domain.is_empty() {
        return None;
    }
    Some((local, domain))
}

/// A plausible local part: starts alphanumeric, then alphanumerics and
/// `+ - . _` only.
fn is_valid_local(local: &str) -> bool {
    let mut chars = local.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    local
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.' | '_'))
}

/// Folds provider aliasing out of a local part: drop everything from the
/// first `+`, then remove the dots.
fn normalise_local(local: &str) -> String {
    let without_tag = match local.find('+') {
        Some(plus) => &local[..plus],
        None => local,
    };
    without_tag.replace('.', "")
}

/// `mail.example.com` → `com.example.mail`, so per-provider keys group
/// lexicographically in the store.
fn reversed_domain(domain: &str) -> String {
    domain.rsplit('.').collect::<Vec<_>>().join(".")
}

/// Derives the rate-limit identity for a sender address.
///
/// Returns `None` for an address too malformed to rate-limit meaningfully
/// (no `@`, empty parts, local starting with punctuation); such mail is
/// dropped without a reply.
pub fn identity_for(address: &str) -> Option<Identity> {
    let (local, domain) = separate(address)?;
    if !is_valid_local(local) {
        return None;
    }

    let domain = domain.to_ascii_lowercase();
    let reversed = reversed_domain(&domain);

    if WHITELISTED_DOMAINS.contains(&domain.as_str()) {
        let local = normalise_local(&local.to_ascii_lowercase());
        Some(Identity::new(format!("complete.({reversed}).({local})")))
    } else {
        Some(Identity::new(format!("nolocal.({reversed})")))
    }
}
