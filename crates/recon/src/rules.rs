//! Closed sets of evidence phrases.
//!
//! Each rule is an exact, case-sensitive substring of an artifact's text.
//! Order in `ALL` is the order rules are tried; the first hit names the
//! evidence.

pub trait RuleSet: Copy + 'static {
    const ALL: &'static [Self];

    fn needle(self) -> &'static str;

    /// Stable identifier recorded as evidence.
    fn tag(self) -> &'static str;

    fn find_in(text: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|rule| text.contains(rule.needle()))
    }
}

/// Clearinghouse rejections of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionRule {
    /// 501: cancellation requested after the deadline.
    LateCancellation,
    /// 493: the cancellation event failed schema validation.
    SchemaViolation,
    /// 221: the recipient already confirmed receipt.
    ReceiptAlreadyConfirmed,
}

impl RuleSet for RejectionRule {
    const ALL: &'static [Self] = &[
        Self::LateCancellation,
        Self::SchemaViolation,
        Self::ReceiptAlreadyConfirmed,
    ];

    fn needle(self) -> &'static str {
        match self {
            Self::LateCancellation => "501 : Rejeição: Pedido de Cancelamento intempestivo",
            Self::SchemaViolation => "493 : Rejeição: Evento não atende o Schema XML específico",
            Self::ReceiptAlreadyConfirmed => {
                "221 : Rejeição: Confirmado o recebimento da NF-e pelo destinatário"
            }
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Self::LateCancellation => "rejection_501",
            Self::SchemaViolation => "rejection_493",
            Self::ReceiptAlreadyConfirmed => "rejection_221",
        }
    }
}

/// Voiding declarations: the number was never validly issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoidingRule {
    NotAuthorized,
    SequenceBreak,
    ServiceMarker,
}

impl RuleSet for VoidingRule {
    const ALL: &'static [Self] = &[Self::NotAuthorized, Self::SequenceBreak, Self::ServiceMarker];

    fn needle(self) -> &'static str {
        match self {
            Self::NotAuthorized => "NOTA NAO AUTORIZADA",
            Self::SequenceBreak => "QUEBRA DE SEQUENCIA",
            Self::ServiceMarker => "<xServ>INUTILIZAR</xServ>",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Self::NotAuthorized => "voiding_not_authorized",
            Self::SequenceBreak => "voiding_sequence_break",
            Self::ServiceMarker => "voiding_service_marker",
        }
    }
}
