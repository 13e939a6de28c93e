use std::fmt::Write as _;

use anyhow::Result;
use flow_core::{ReceiptDraft, ReceiptRenderer};

const WIDTH: usize = 56;

/// Fixed-width text receipt, one service line per row.
pub struct PlainTextReceipt;

fn row(out: &mut String, label: &str, value: &str) -> std::fmt::Result {
    let pad = WIDTH.saturating_sub(label.len() + value.len()).max(1);
    writeln!(out, "{label}{}{value}", " ".repeat(pad))
}

impl ReceiptRenderer for PlainTextReceipt {
    fn render(&self, draft: &ReceiptDraft) -> Result<Vec<u8>> {
        let mut out = String::new();
        let rule = "-".repeat(WIDTH);
        writeln!(out, "{:^WIDTH$}", "Master-Fees")?;
        writeln!(out, "{:^WIDTH$}", draft.school_name)?;
        writeln!(out, "{:^WIDTH$}", "Payment Receipt")?;
        writeln!(out, "{:^WIDTH$}", "Your payment has been successfully done.")?;
        writeln!(out, "{rule}")?;
        row(&mut out, "Ref Number", &draft.reference)?;
        row(
            &mut out,
            "Payment Time",
            &draft.issued_at.format("%b %-d, %Y, %H:%M").to_string(),
        )?;
        row(&mut out, "Schedule ID", &draft.schedule_id)?;
        writeln!(out, "{rule}")?;
        for line in &draft.lines {
            row(&mut out, &line.description, &line.amount.to_string())?;
            writeln!(out, "  {} | Invoice No. {}", line.student_name, line.invoice_no)?;
        }
        writeln!(out, "{rule}")?;
        row(&mut out, "Subtotal", &draft.subtotal.to_string())?;
        row(
            &mut out,
            &format!(
                "Service Fee ({}.{:02}%)",
                draft.service_fee_bps / 100,
                draft.service_fee_bps % 100
            ),
            &draft.service_fee.to_string(),
        )?;
        row(&mut out, "Total", &draft.total_with_fee.to_string())?;
        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use flow_core::SessionData;
    use shared::{
        domain::ServiceId,
        records::{CheckoutService, Money},
    };

    use super::*;

    #[test]
    fn renders_lines_and_totals() {
        let session = SessionData {
            selected_school: Some("Twalumbu Educational Center".into()),
            checkout_services: vec![CheckoutService {
                id: ServiceId::new("svc-1"),
                description: "Canteen (Lunch) - March".into(),
                amount: Money::from_kwacha(1000),
                invoice_no: "INV-0001".into(),
                student_name: "Isaiah Kapambwe".into(),
            }],
            payment_amount: Money::from_kwacha(1000),
            ..SessionData::default()
        };
        let issued_at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        let draft = ReceiptDraft::prepare_at(&session, "fallback", 200, issued_at).expect("draft");

        let bytes = PlainTextReceipt.render(&draft).expect("render");
        let text = String::from_utf8(bytes).expect("utf8");

        assert!(text.contains("Twalumbu Educational Center"));
        assert!(text.contains("Canteen (Lunch) - March"));
        assert!(text.contains("Isaiah Kapambwe | Invoice No. INV-0001"));
        assert!(text.contains("Service Fee (2.00%)"));
        assert!(text.contains("ZMW 1,020.00"));
        assert!(text.contains("Mar 14, 2025, 09:30"));
    }
}
