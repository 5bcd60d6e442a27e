use crate::models::Registration;

pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

const HEADER: [&str; 8] = [
    "Name",
    "Email",
    "Phone",
    "College",
    "UTR",
    "Status",
    "Checked In",
    "Created At",
];

pub fn export_filename(event_name: &str) -> String {
    format!("{}-registrations.csv", event_name.trim().to_lowercase())
}

pub fn registrations_csv(rows: &[Registration]) -> String {
    let mut out = String::new();
    push_record(&mut out, HEADER.iter().copied());

    for row in rows {
        let checked_in = if row.checked_in { "Yes" } else { "No" };
        let created_at = row.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
        push_record(
            &mut out,
            [
                row.name.as_str(),
                row.email.as_str(),
                row.phone.as_str(),
                row.roll_college.as_str(),
                row.utr.as_str(),
                row.status.as_str(),
                checked_in,
                created_at.as_str(),
            ],
        );
    }
    out
}

fn push_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (index, field) in fields.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push_str("\r\n");
}

fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn row(name: &str, roll_college: &str, checked_in: bool) -> Registration {
        Registration {
            id: Uuid::new_v4(),
            name: name.into(),
            email: "asha@x.com".into(),
            phone: "9876543210".into(),
            roll_college: roll_college.into(),
            utr: "TXN001".into(),
            screenshot_url: None,
            status: if checked_in { "verified" } else { "pending" }.into(),
            checked_in,
            created_at: NaiveDate::from_ymd_opt(2026, 1, 10)
                .and_then(|d| d.and_hms_opt(9, 30, 0))
                .unwrap(),
            verified_at: None,
            ticket_url: None,
        }
    }

    #[test]
    fn writes_header_and_plain_rows() {
        let csv = registrations_csv(&[row("Asha", "AMCH 42", false)]);
        let mut lines = csv.split("\r\n");
        assert_eq!(
            lines.next(),
            Some("Name,Email,Phone,College,UTR,Status,Checked In,Created At")
        );
        assert_eq!(
            lines.next(),
            Some("Asha,asha@x.com,9876543210,AMCH 42,TXN001,pending,No,2026-01-10 09:30:00")
        );
    }

    #[test]
    fn quotes_fields_with_separators() {
        let csv = registrations_csv(&[row("Das, \"Bonny\"", "AMCH\nDibrugarh", true)]);
        assert!(csv.contains("\"Das, \"\"Bonny\"\"\""));
        assert!(csv.contains("\"AMCH\nDibrugarh\""));
        assert!(csv.contains(",verified,Yes,"));
    }

    #[test]
    fn filename_uses_event_name() {
        assert_eq!(export_filename("COALESCE"), "coalesce-registrations.csv");
    }
}
