//! Invoice document → [`InvoiceRecord`].
//!
//! Field lookup is a pre-order, first-match traversal over local element
//! names: the first start tag named `nNF` in document order wins, whatever
//! namespace prefix it carries, and its value is the character data that
//! follows it up to the next tag. A second `nNF` later in the document is
//! never consulted, even when the first one is empty.

use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::coerce::{coerce_decimal_auto, coerce_int};
use crate::error::ReconError;
use crate::model::InvoiceRecord;
use crate::timestamp::{parse_issued_at, IssuedAt};

const NAT_OP: usize = 0;
const C_NF: usize = 1;
const N_NF: usize = 2;
const V_NF: usize = 3;
const DH_EMI: usize = 4;

const FIELDS: [&[u8]; 5] = [b"natOp", b"cNF", b"nNF", b"vNF", b"dhEmi"];

/// Extracts sale invoices; everything else is out of scope.
#[derive(Debug, Clone)]
pub struct Extractor {
    sale_kind: String,
    marker_tag: String,
}

impl Extractor {
    pub fn new(sale_kind: impl Into<String>) -> Self {
        let sale_kind = sale_kind.into();
        let marker_tag = format!("<natOp>{sale_kind}</natOp>");
        Self {
            sale_kind,
            marker_tag,
        }
    }

    /// `None` for out-of-scope and malformed documents alike.
    pub fn extract(&self, text: &str) -> Option<InvoiceRecord> {
        self.extract_checked("document", text).ok().flatten()
    }

    /// `Ok(None)`: not a sale document. `Err`: a sale document that cannot be
    /// parsed or lacks a required field.
    pub fn extract_checked(&self, name: &str, text: &str) -> Result<Option<InvoiceRecord>, ReconError> {
        if !text.contains(&self.marker_tag) {
            return Ok(None);
        }

        let fields = first_field_texts(text).map_err(|e| ReconError::malformed(name, e))?;

        let kind = fields[NAT_OP].as_deref().unwrap_or_default();
        if kind != self.sale_kind {
            return Ok(None);
        }

        let control_code = coerce_int(required(&fields, C_NF, name)?);
        let number_text = required(&fields, N_NF, name)?;
        let amount_text = required(&fields, V_NF, name)?;
        let issued_text = required(&fields, DH_EMI, name)?;

        let number = coerce_int(number_text);
        if number <= 0 {
            return Err(ReconError::malformed(
                name,
                format!("invoice number '{number_text}' is not a positive integer"),
            ));
        }

        let amount = coerce_decimal_auto(amount_text);
        if amount < 0.0 {
            return Err(ReconError::malformed(
                name,
                format!("declared amount '{amount_text}' is negative"),
            ));
        }

        Ok(Some(InvoiceRecord {
            kind: kind.to_string(),
            control_code,
            number,
            amount,
            issued_at: IssuedAt::parse(issued_text),
        }))
    }
}

fn required<'a>(fields: &'a [Option<String>; 5], idx: usize, name: &str) -> Result<&'a str, ReconError> {
    fields[idx]
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            let tag = String::from_utf8_lossy(FIELDS[idx]);
            ReconError::malformed(name, format!("missing or empty <{tag}>"))
        })
}

/// Reads the whole document; a well-formedness error anywhere fails it.
fn first_field_texts(text: &str) -> Result<[Option<String>; 5], String> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut seen = [false; 5];
    let mut values: [Option<String>; 5] = Default::default();
    let mut current: Option<usize> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                current = claim(&mut seen, e.local_name().as_ref());
                if let Some(idx) = current {
                    values[idx] = Some(String::new());
                }
            }
            Ok(Event::Empty(ref e)) => {
                // Claims the field with no text.
                claim(&mut seen, e.local_name().as_ref());
                current = None;
            }
            Ok(Event::Text(ref e)) => {
                if let Some(idx) = current {
                    push_text(&mut values[idx], e.as_ref());
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(idx) = current {
                    push_text(&mut values[idx], e.as_ref());
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML error at byte {}: {e}",
                    reader.error_position()
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    for value in values.iter_mut() {
        if let Some(v) = value.as_mut() {
            *v = v.trim().to_string();
        }
    }
    Ok(values)
}

fn claim(seen: &mut [bool; 5], local_name: &[u8]) -> Option<usize> {
    let idx = FIELDS.iter().position(|f| *f == local_name)?;
    if seen[idx] {
        return None;
    }
    seen[idx] = true;
    Some(idx)
}

fn push_text(slot: &mut Option<String>, bytes: &[u8]) {
    slot.get_or_insert_with(String::new)
        .push_str(&String::from_utf8_lossy(bytes));
}

/// Issuance date from a bounded document prefix.
///
/// Stops at the first `dhEmi` element. Returns `None` when the prefix ends
/// before that element closes, or the timestamp does not parse; the caller
/// then falls back to the full extraction.
pub fn sniff_issue_date(prefix: &str) -> Option<NaiveDate> {
    let mut reader = Reader::from_str(prefix);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut text: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if text.is_some() {
                    // Nested markup inside dhEmi: treat what we have as complete.
                    break;
                }
                if e.local_name().as_ref() == FIELDS[DH_EMI] {
                    text = Some(String::new());
                }
            }
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == FIELDS[DH_EMI] => return None,
            Ok(Event::Text(ref e)) => {
                if let Some(t) = text.as_mut() {
                    t.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::End(_)) if text.is_some() => break,
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }

    text.and_then(|t| parse_issued_at(t.trim())).map(|dt| dt.date())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn nfe(number: &str, amount: &str, issued: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
  <NFe>
    <infNFe Id="NFe35251000000000000000550010000000421000000000" versao="4.00">
      <ide>
        <cUF>35</cUF>
        <cNF>00001234</cNF>
        <natOp>VENDA</natOp>
        <mod>55</mod>
        <serie>1</serie>
        <nNF>{number}</nNF>
        <dhEmi>{issued}</dhEmi>
      </ide>
      <total>
        <ICMSTot>
          <vProd>{amount}</vProd>
          <vNF>{amount}</vNF>
        </ICMSTot>
      </total>
    </infNFe>
  </NFe>
</nfeProc>"#
        )
    }

    fn extractor() -> Extractor {
        Extractor::new("VENDA")
    }

    #[test]
    fn extracts_sale_invoice() {
        let record = extractor()
            .extract(&nfe("42", "1.500,00", "2025-10-03T14:22:05-03:00"))
            .unwrap();
        assert_eq!(record.kind, "VENDA");
        assert_eq!(record.control_code, 1234);
        assert_eq!(record.number, 42);
        assert_eq!(record.amount, 1500.0);
        assert_eq!(record.issued_at.to_string(), "03/10/2025 14:22");
        assert_eq!(record.key(), "00000042");
    }

    #[test]
    fn point_decimal_amount() {
        let record = extractor()
            .extract(&nfe("7", "1500.00", "2025-10-03T14:22:05-03:00"))
            .unwrap();
        assert_eq!(record.amount, 1500.0);
    }

    #[test]
    fn non_sale_is_out_of_scope() {
        let doc = nfe("42", "10.00", "2025-10-03T14:22:05-03:00")
            .replace("<natOp>VENDA</natOp>", "<natOp>DEVOLUCAO</natOp>");
        assert_eq!(extractor().extract_checked("a.xml", &doc).unwrap(), None);
    }

    #[test]
    fn prefixed_elements_are_found() {
        let doc = r#"<nfe:NFe xmlns:nfe="urn:x"><nfe:ide><nfe:cNF>9</nfe:cNF>
<natOp>VENDA</natOp><nfe:nNF>55</nfe:nNF><nfe:dhEmi>2025-10-01 08:00:00</nfe:dhEmi>
</nfe:ide><nfe:vNF>12,50</nfe:vNF></nfe:NFe>"#;
        let record = extractor().extract(doc).unwrap();
        assert_eq!(record.number, 55);
        assert_eq!(record.control_code, 9);
        assert_eq!(record.amount, 12.5);
    }

    #[test]
    fn first_match_wins_even_when_empty() {
        let doc = r#"<r><natOp>VENDA</natOp><cNF>1</cNF><nNF></nNF><vNF>1.00</vNF>
<dhEmi>2025-10-01 08:00:00</dhEmi><nNF>99</nNF></r>"#;
        let err = extractor().extract_checked("x.xml", doc).unwrap_err();
        assert!(err.to_string().contains("<nNF>"), "{err}");
    }

    #[test]
    fn missing_field_is_malformed() {
        let doc = nfe("42", "10.00", "2025-10-03T14:22:05-03:00").replace("<cNF>00001234</cNF>", "");
        let err = extractor().extract_checked("x.xml", &doc).unwrap_err();
        assert!(matches!(err, ReconError::MalformedDocument { .. }));
        assert!(err.to_string().contains("cNF"));
    }

    #[test]
    fn broken_xml_is_malformed() {
        let doc = "<r><natOp>VENDA</natOp><cNF>1</nNF></r>";
        assert!(extractor().extract_checked("x.xml", doc).is_err());
        assert_eq!(extractor().extract(doc), None);
    }

    #[test]
    fn zero_invoice_number_is_rejected() {
        let doc = nfe("abc", "10.00", "2025-10-03T14:22:05-03:00");
        let err = extractor().extract_checked("x.xml", &doc).unwrap_err();
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn unparsable_timestamp_keeps_text() {
        let record = extractor().extract(&nfe("42", "1,00", "03/10/2025")).unwrap();
        assert!(record.issued_at.is_fallback());
        assert_eq!(record.issued_at.to_string(), "03/10/2025");
    }

    #[test]
    fn sniff_reads_date_from_prefix() {
        let doc = nfe("42", "1,00", "2025-10-03T14:22:05-03:00");
        assert_eq!(sniff_issue_date(&doc), NaiveDate::from_ymd_opt(2025, 10, 3));
    }

    #[test]
    fn sniff_gives_up_on_truncated_element() {
        let doc = nfe("42", "1,00", "2025-10-03T14:22:05-03:00");
        let cut = doc.find("2025-10-03").unwrap() + 6;
        assert_eq!(sniff_issue_date(&doc[..cut]), None);
        // but the prefix that ends right after the closing tag is enough
        let end = doc.find("</dhEmi>").unwrap() + "</dhEmi>".len();
        assert_eq!(sniff_issue_date(&doc[..end]), NaiveDate::from_ymd_opt(2025, 10, 3));
    }

    proptest! {
        #[test]
        fn sniff_agrees_with_full_parse(
            year in 2000i32..2100,
            month in 1u32..=12,
            day in 1u32..=28,
            hour in 0u32..24,
            minute in 0u32..60,
            t_sep in proptest::bool::ANY,
            offset in proptest::sample::select(vec!["", "-03:00", "-04:00"]),
            limit in 64usize..2048,
        ) {
            let sep = if t_sep { 'T' } else { ' ' };
            let issued = format!("{year:04}-{month:02}-{day:02}{sep}{hour:02}:{minute:02}:00{offset}");
            let doc = nfe("42", "10,00", &issued);
            let full = extractor().extract(&doc).and_then(|r| r.issued_at.date());
            let limit = limit.min(doc.len());
            // prefixes are cut on a char boundary; the fixture is ASCII
            if let (Some(sniffed), Some(full)) = (sniff_issue_date(&doc[..limit]), full) {
                prop_assert_eq!(sniffed, full);
            }
            prop_assert_eq!(sniff_issue_date(&doc), full);
        }
    }
}
