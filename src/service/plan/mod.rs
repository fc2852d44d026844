mod model;

pub use model::Plan;

/// Plans in the order they are offered.
const PLANS: &[Plan] = &[
    Plan {
        id: "1month",
        duration_months: 1,
        price: 400,
        description: "Premium for 1 month",
    },
    Plan {
        id: "3months",
        duration_months: 3,
        price: 1050,
        description: "Premium for 3 months",
    },
    Plan {
        id: "6months",
        duration_months: 6,
        price: 1900,
        description: "Premium for 6 months",
    },
    Plan {
        id: "12months",
        duration_months: 12,
        price: 3400,
        description: "Premium for 12 months",
    },
];

#[derive(Clone, Debug)]
pub struct PlanCatalog {
    plans: &'static [Plan],
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self { plans: PLANS }
    }
}

impl PlanCatalog {
    pub fn get(&self, plan_id: &str) -> Option<&'static Plan> {
        self.plans.iter().find(|plan| plan.id == plan_id)
    }

    pub fn list(&self) -> &'static [Plan] {
        self.plans
    }
}
