// Utilitários para manipulação de valores monetários

/// Formats an amount in its own currency; no conversion is performed.
pub fn format_amount(amount: f64, currency: &str) -> String {
    if currency.is_empty() {
        format!("{:.2}", amount)
    } else {
        format!("{:.2} {}", amount, currency.to_uppercase())
    }
}
