//! Content mapping between case-system records and tracker issues.
//!
//! Pure functions only: titles, mail rendering, HTML flattening, and file-name
//! fix-ups. The engine composes them; adapters never see these rules.

use crate::records::InboundMail;
use crate::CaseKey;

const MAIL_RULE: &str = "_____________________________________________________";

/// Tags that start a new line when flattened to text.
const LINE_BREAK_TAGS: [&str; 3] = ["br", "p", "div"];

/// Title of the tracker issue mirroring `case_key`.
pub fn issue_title(case_key: &CaseKey, summary: Option<&str>) -> String {
    format!("Supportärende {} ({})", case_key, summary.unwrap_or_default())
}

/// Message announcing a newly created tracker issue.
pub fn creation_notice(browse_url: &str, tracker_key: &str) -> String {
    format!(
        "A new issue has been created for you: {}/browse/{}",
        browse_url.trim_end_matches('/'),
        tracker_key
    )
}

/// Shape of a tracker comment once imported as a case-system note.
pub fn imported_comment(author_display_name: &str, body: &str) -> String {
    format!("{author_display_name}:\n {body}")
}

/// Whether `status_name` is one of the configured closed statuses.
pub fn is_closed_status(status_name: &str, closed_statuses: &[String]) -> bool {
    closed_statuses
        .iter()
        .any(|closed| closed.eq_ignore_ascii_case(status_name))
}

/// Renders an inbound mail as a tracker comment.
pub fn format_mail(mail: &InboundMail) -> String {
    let attachments = mail
        .attachments
        .iter()
        .map(|file| file.file_name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let body = mail.body.as_deref().map(strip_html).unwrap_or_default();

    format!(
        "{MAIL_RULE}\nTo: {}\nFrom: {}\nSubject: {}\nDate: {}\nAttachments: {}\n{MAIL_RULE}\n\n{}\n",
        mail.to.as_deref().unwrap_or_default(),
        mail.from.as_deref().unwrap_or_default(),
        mail.subject.as_deref().unwrap_or_default(),
        mail.send_date.as_deref().unwrap_or_default(),
        attachments,
        body,
    )
}

/// Name under which a case attachment is uploaded to the tracker.
///
/// Case-system file names sometimes lack an extension; the MIME subtype of the
/// reported content type fills the gap (`"scan"` + `image/png` → `"scan.png"`).
pub fn attachment_file_name(file_name: &str, content_type: Option<&str>) -> String {
    if file_name.contains('.') {
        return file_name.to_string();
    }
    let subtype = content_type
        .and_then(|ct| ct.split(';').next())
        .and_then(|mime| mime.split_once('/'))
        .map(|(_, subtype)| subtype.trim())
        .filter(|subtype| !subtype.is_empty());

    match subtype {
        Some(subtype) => format!("{file_name}.{subtype}"),
        None => file_name.to_string(),
    }
}

/// Extension of `file_name` with a leading dot, or an empty string.
pub fn file_extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => format!(".{ext}"),
        _ => String::new(),
    }
}

/// Flattens case-system HTML to plain text.
///
/// `<br>`, `<p>` and `<div>` start new lines, every other tag is dropped,
/// common entities are decoded, and blank lines are removed.
pub fn strip_html(source: &str) -> String {
    let mut text = String::with_capacity(source.len());
    let mut chars = source.chars();

    while let Some(c) = chars.next() {
        if c != '<' {
            text.push(c);
            continue;
        }
        let mut tag = String::new();
        for inner in chars.by_ref() {
            if inner == '>' {
                break;
            }
            tag.push(inner);
        }
        let name = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        if LINE_BREAK_TAGS.contains(&name.as_str()) {
            text.push('\n');
        }
    }

    decode_entities(&text)
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::NamedFile;

    #[test]
    fn title_embeds_case_key_and_summary() {
        let key = CaseKey::new("POB-1").unwrap();
        assert_eq!(
            issue_title(&key, Some("Printer on fire")),
            "Supportärende POB-1 (Printer on fire)"
        );
        assert_eq!(issue_title(&key, None), "Supportärende POB-1 ()");
    }

    #[test]
    fn closed_status_match_ignores_case() {
        let closed = vec!["Done".to_string(), "Won't do".to_string()];
        assert!(is_closed_status("done", &closed));
        assert!(is_closed_status("WON'T DO", &closed));
        assert!(!is_closed_status("In Progress", &closed));
    }

    #[test]
    fn html_is_flattened_to_lines() {
        let html = "<div>Hello&nbsp;there</div><p>Second <b>line</b></p>third<br>fourth &amp; more";
        assert_eq!(
            strip_html(html),
            "Hello there\nSecond line\nthird\nfourth & more"
        );
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(strip_html("  just text \n\n next "), "just text\n next");
    }

    #[test]
    fn mail_renders_header_block() {
        let mail = InboundMail {
            id: "m1".into(),
            from: Some("alice@example.com".into()),
            to: Some("support@example.com".into()),
            subject: Some("Broken login".into()),
            send_date: Some("2026-03-01 10:00".into()),
            body: Some("<p>It fails</p>".into()),
            attachments: vec![
                NamedFile {
                    file_name: "a.png".into(),
                    content: vec![1],
                },
                NamedFile {
                    file_name: "b.txt".into(),
                    content: vec![2],
                },
            ],
            ..InboundMail::default()
        };
        let rendered = format_mail(&mail);
        assert!(rendered.starts_with(MAIL_RULE));
        assert!(rendered.contains("To: support@example.com\nFrom: alice@example.com\n"));
        assert!(rendered.contains("Subject: Broken login\nDate: 2026-03-01 10:00\n"));
        assert!(rendered.contains("Attachments: a.png, b.txt\n"));
        assert!(rendered.ends_with("\n\nIt fails\n"));
    }

    #[test]
    fn attachment_names_gain_subtype_extension() {
        assert_eq!(attachment_file_name("scan", Some("image/png")), "scan.png");
        assert_eq!(
            attachment_file_name("scan", Some("application/pdf; charset=binary")),
            "scan.pdf"
        );
        assert_eq!(attachment_file_name("report.docx", Some("image/png")), "report.docx");
        assert_eq!(attachment_file_name("scan", None), "scan");
    }

    #[test]
    fn file_extension_includes_dot() {
        assert_eq!(file_extension("report.pdf"), ".pdf");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("README"), "");
        assert_eq!(file_extension(".hidden"), "");
    }

    #[test]
    fn creation_notice_links_issue() {
        assert_eq!(
            creation_notice("https://tracker.example.com/", "JIR-9"),
            "A new issue has been created for you: https://tracker.example.com/browse/JIR-9"
        );
    }
}
