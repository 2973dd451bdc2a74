use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::PricingUnit;
use crate::tour::TourTemplate;
use crate::{require_amount, CatalogError, CatalogResult};

/// A service line costed into a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateLine {
    pub service_id: Uuid,
    pub name: String,
    pub pricing_unit: PricingUnit,
    pub unit_price_cents: i64,
    pub quantity: i32,
}

impl EstimateLine {
    /// Cost of the line for the whole departure, independent of group size.
    fn fixed_cost(&self, duration_days: i32) -> Option<i64> {
        let qty = i64::from(self.quantity);
        match self.pricing_unit {
            PricingUnit::PerPerson => Some(0),
            PricingUnit::PerGroup => self.unit_price_cents.checked_mul(qty),
            PricingUnit::PerDay => self
                .unit_price_cents
                .checked_mul(qty)?
                .checked_mul(i64::from(duration_days)),
        }
    }

    fn cost_per_person(&self) -> Option<i64> {
        match self.pricing_unit {
            PricingUnit::PerPerson => self.unit_price_cents.checked_mul(i64::from(self.quantity)),
            _ => Some(0),
        }
    }
}

/// Cost and price figures shown next to the tour edit form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEstimate {
    pub pax: i32,
    pub group_cost_cents: i64,
    pub per_person_cost_cents: i64,
    pub total_cost_cents: i64,
    pub cost_per_person_cents: i64,
    pub margin: f64,
    pub suggested_price_cents: i64,
    pub selling_price_cents: i64,
    pub revenue_cents: i64,
    pub profit_cents: i64,
    pub break_even_pax: Option<i64>,
}

fn ceil_div(numerator: i64, denominator: i64) -> Option<i64> {
    numerator.checked_add(denominator - 1).map(|n| n / denominator)
}

fn sum(mut values: impl Iterator<Item = Option<i64>>) -> Option<i64> {
    values.try_fold(0i64, |acc, v| acc.checked_add(v?))
}

fn too_large() -> CatalogError {
    CatalogError::Validation("estimate figures are too large".into())
}

/// Linear cost model: fixed group costs plus a per-head cost, marked up by the
/// template margin. Selling price is the override when given, else the base price.
pub fn estimate(
    template: &TourTemplate,
    lines: &[EstimateLine],
    pax: i32,
    price_override_cents: Option<i64>,
) -> CatalogResult<PricingEstimate> {
    if pax < 1 {
        return Err(CatalogError::Validation("pax must be at least 1".into()));
    }
    if let Some(price) = price_override_cents {
        require_amount("price_override_cents", price)?;
    }
    let heads = i64::from(pax);

    let group_cost = sum(lines.iter().map(|l| l.fixed_cost(template.duration_days))).ok_or_else(too_large)?;
    let per_person_cost = sum(lines.iter().map(EstimateLine::cost_per_person)).ok_or_else(too_large)?;
    let total_cost = per_person_cost
        .checked_mul(heads)
        .and_then(|c| c.checked_add(group_cost))
        .ok_or_else(too_large)?;
    let cost_per_person = ceil_div(total_cost, heads).ok_or_else(too_large)?;

    // Margin in basis points keeps the mark-up in integer arithmetic.
    let margin_bps = (template.margin * 10_000.0).round() as i64;
    let suggested_price = cost_per_person
        .checked_mul(10_000 + margin_bps)
        .and_then(|c| ceil_div(c, 10_000))
        .ok_or_else(too_large)?;

    let selling_price = price_override_cents.unwrap_or(template.base_price_cents);
    let revenue = selling_price.checked_mul(heads).ok_or_else(too_large)?;
    let contribution = selling_price - per_person_cost;
    let break_even_pax = if contribution > 0 {
        Some(ceil_div(group_cost, contribution).ok_or_else(too_large)?.max(1))
    } else {
        None
    };

    Ok(PricingEstimate {
        pax,
        group_cost_cents: group_cost,
        per_person_cost_cents: per_person_cost,
        total_cost_cents: total_cost,
        cost_per_person_cents: cost_per_person,
        margin: template.margin,
        suggested_price_cents: suggested_price,
        selling_price_cents: selling_price,
        revenue_cents: revenue,
        profit_cents: revenue - total_cost,
        break_even_pax,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn template(base_price_cents: i64, margin: f64) -> TourTemplate {
        TourTemplate {
            id: Uuid::new_v4(),
            tour_id: Uuid::new_v4(),
            title: "Peloponnese Classics".into(),
            duration_days: 3,
            itinerary: vec![],
            base_price_cents,
            default_capacity: 20,
            margin,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(unit: PricingUnit, price: i64, qty: i32) -> EstimateLine {
        EstimateLine {
            service_id: Uuid::new_v4(),
            name: format!("{} line", unit),
            pricing_unit: unit,
            unit_price_cents: price,
            quantity: qty,
        }
    }

    fn sample_lines() -> Vec<EstimateLine> {
        vec![
            line(PricingUnit::PerPerson, 12_000, 2), // two hotel nights
            line(PricingUnit::PerDay, 30_000, 1),    // coach
            line(PricingUnit::PerGroup, 50_000, 1),  // licensed guide
        ]
    }

    #[test]
    fn estimate_for_ten_passengers() {
        let est = estimate(&template(45_000, 0.25), &sample_lines(), 10, None).unwrap();

        assert_eq!(est.group_cost_cents, 140_000);
        assert_eq!(est.per_person_cost_cents, 24_000);
        assert_eq!(est.total_cost_cents, 380_000);
        assert_eq!(est.cost_per_person_cents, 38_000);
        assert_eq!(est.suggested_price_cents, 47_500);
        assert_eq!(est.revenue_cents, 450_000);
        assert_eq!(est.profit_cents, 70_000);
        assert_eq!(est.break_even_pax, Some(7));
    }

    #[test]
    fn override_price_drives_revenue() {
        let est = estimate(&template(45_000, 0.25), &sample_lines(), 10, Some(40_000)).unwrap();
        assert_eq!(est.selling_price_cents, 40_000);
        assert_eq!(est.revenue_cents, 400_000);
        assert_eq!(est.profit_cents, 20_000);
    }

    #[test]
    fn no_break_even_when_price_below_head_cost() {
        let est = estimate(&template(20_000, 0.1), &sample_lines(), 4, None).unwrap();
        assert_eq!(est.break_even_pax, None);
        assert!(est.profit_cents < 0);
    }

    #[test]
    fn cost_per_person_rounds_up() {
        let lines = vec![line(PricingUnit::PerGroup, 10_000, 1)];
        let est = estimate(&template(5_000, 0.1), &lines, 3, None).unwrap();
        assert_eq!(est.cost_per_person_cents, 3_334);
        assert_eq!(est.suggested_price_cents, 3_668);
    }

    #[test]
    fn oversized_lines_are_rejected_not_wrapped() {
        let lines = vec![line(PricingUnit::PerDay, i64::MAX / 4, 2)];
        assert!(matches!(
            estimate(&template(45_000, 0.25), &lines, 1, None),
            Err(CatalogError::Validation(_))
        ));

        let lines = vec![line(PricingUnit::PerPerson, i64::MAX / 2, 1)];
        assert!(matches!(
            estimate(&template(45_000, 0.25), &lines, 3, None),
            Err(CatalogError::Validation(_))
        ));

        assert!(estimate(&template(45_000, 0.25), &[], 2, Some(i64::MAX)).is_err());
    }

    #[test]
    fn pax_must_be_positive() {
        assert!(estimate(&template(45_000, 0.25), &[], 0, None).is_err());
    }
}
