use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: &'static str,
    pub duration_months: u32,
    /// Whole currency units, the form `OutSum` is sent in.
    pub price: u32,
    pub description: &'static str,
}

impl Plan {
    pub fn price_string(&self) -> String {
        self.price.to_string()
    }

    /// Compares a provider-reported amount such as `400.000000` against the plan price.
    pub fn matches_amount(&self, amount: &str) -> bool {
        amount
            .trim()
            .parse::<f64>()
            .map(|paid| (paid - f64::from(self.price)).abs() < 0.005)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_amount() {
        let plan = Plan {
            id: "1month",
            duration_months: 1,
            price: 400,
            description: "Premium for 1 month",
        };

        assert!(plan.matches_amount("400"));
        assert!(plan.matches_amount("400.00"));
        assert!(plan.matches_amount("400.000000"));
        assert!(!plan.matches_amount("399.99"));
        assert!(!plan.matches_amount("40"));
        assert!(!plan.matches_amount("four hundred"));
    }
}
