use super::money::{Amount, FeeRule};
use super::payment::{PaymentMethod, ProviderFamily};
use crate::error::ProviderError;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;

/// What the customer pays for a plan through one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub amount: i64,
    pub fee: i64,
    pub total: i64,
}

/// Static table of supported payment methods, in display order.
#[derive(Debug, Clone)]
pub struct FeeCatalog {
    methods: Arc<[PaymentMethod]>,
}

impl Default for FeeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl FeeCatalog {
    pub fn new() -> Self {
        Self::from_methods(builtin_methods())
    }

    /// Builds a catalog from an explicit table; the first entry marked
    /// `recommended` is listed first.
    pub fn from_methods(mut methods: Vec<PaymentMethod>) -> Self {
        methods.sort_by_key(|m| !m.recommended);
        Self {
            methods: methods.into(),
        }
    }

    pub fn list_methods(&self) -> &[PaymentMethod] {
        &self.methods
    }

    pub fn find(&self, method_id: &str) -> Result<&PaymentMethod, ProviderError> {
        self.methods
            .iter()
            .find(|m| m.id == method_id)
            .ok_or_else(|| ProviderError::UnsupportedMethod(method_id.to_string()))
    }

    pub fn methods_for(&self, family: ProviderFamily) -> impl Iterator<Item = &PaymentMethod> {
        self.methods.iter().filter(move |m| m.provider_family == family)
    }

    pub fn compute_fee(&self, amount: Amount, method_id: &str) -> Result<i64, ProviderError> {
        Ok(self.find(method_id)?.fee_rule.apply(amount))
    }

    pub fn quote(&self, amount: Amount, method_id: &str) -> Result<Quote, ProviderError> {
        let fee = self.compute_fee(amount, method_id)?;
        Ok(Quote {
            amount: amount.minor_units(),
            fee,
            total: amount.minor_units().saturating_add(fee),
        })
    }

    /// The method charging the lowest fee for `amount`; ties keep display order.
    pub fn cheapest_for(&self, amount: Amount) -> Option<&PaymentMethod> {
        self.methods.iter().min_by_key(|m| m.fee_rule.apply(amount))
    }
}

fn builtin_methods() -> Vec<PaymentMethod> {
    use ProviderFamily::*;

    let va = |id, display_name, channel_code, fee| PaymentMethod {
        id,
        provider_family: VirtualAccount,
        display_name,
        channel_code,
        fee_rule: FeeRule::Fixed(fee),
        recommended: false,
    };
    let wallet = |id, display_name, channel_code, rate| PaymentMethod {
        id,
        provider_family: EWallet,
        display_name,
        channel_code,
        fee_rule: FeeRule::Percentage(rate),
        recommended: false,
    };

    vec![
        PaymentMethod {
            id: "bank_transfer",
            provider_family: ManualTransfer,
            display_name: "Bank Transfer",
            channel_code: "MANUAL",
            fee_rule: FeeRule::Fixed(0),
            recommended: true,
        },
        va("bca_va", "BCA Virtual Account", "BCA", 4000),
        va("mandiri_va", "Mandiri Virtual Account", "MANDIRI", 4000),
        va("bni_va", "BNI Virtual Account", "BNI", 4000),
        va("permata_va", "Permata Virtual Account", "PERMATA", 2500),
        wallet("qris", "QRIS", "ID_QRIS", dec!(0.007)),
        wallet("dana", "DANA", "ID_DANA", dec!(0.015)),
        wallet("ovo", "OVO", "ID_OVO", dec!(0.025)),
        wallet("shopeepay", "ShopeePay", "ID_SHOPEEPAY", dec!(0.02)),
        PaymentMethod {
            id: "invoice",
            provider_family: Invoice,
            display_name: "Card / Hosted Invoice",
            channel_code: "INVOICE",
            fee_rule: FeeRule::Percentage(dec!(0.029)),
            recommended: false,
        },
    ]
}
