use crate::domain::money::Amount;
use crate::domain::payment::PaymentMethod;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct MethodRow<'a> {
    id: &'a str,
    family: String,
    name: &'a str,
    fee_rule: String,
    fee: Option<i64>,
    total: Option<i64>,
    recommended: bool,
}

/// Writes the payment method catalog as CSV, optionally priced for an amount.
pub struct MethodWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> MethodWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Fee and total columns stay empty when no amount is given.
    pub fn write_methods(&mut self, methods: &[PaymentMethod], amount: Option<Amount>) -> Result<()> {
        for method in methods {
            let fee = amount.map(|a| method.fee_rule.apply(a));
            self.writer.serialize(MethodRow {
                id: method.id,
                family: method.provider_family.to_string(),
                name: method.display_name,
                fee_rule: method.fee_rule.to_string(),
                fee,
                total: amount.zip(fee).map(|(a, f)| a.plus(f).minor_units()),
                recommended: method.recommended,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
