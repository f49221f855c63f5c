use chrono::{Datelike, NaiveDate};

use crate::models::ROLE_VIP;

pub const DISCOUNT_TYPE_VIP: &str = "vip";
pub const DISCOUNT_TYPE_BIRTHDAY: &str = "birthday";

const REFILL_BIRTHDAY_DISCOUNT: f64 = 20.0;
const REFILL_VIP_DISCOUNT: f64 = 10.0;
const FULL_SET_VOLUME_DISCOUNT: f64 = 30.0;
const FULL_SET_CLASSIC_DISCOUNT: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discount {
    pub amount: f64,
    pub kind: Option<&'static str>,
}

impl Discount {
    const NONE: Discount = Discount { amount: 0.0, kind: None };

    fn vip(amount: f64) -> Self {
        Discount { amount, kind: Some(DISCOUNT_TYPE_VIP) }
    }
}

/// VIP discount rules. First matching rule wins; rules never stack, and the
/// refill rule is checked before the full-set rules, so a name matching both
/// gets the refill outcome.
pub fn vip_discount(service_name: &str, role: &str, is_birthday_today: bool) -> Discount {
    if role != ROLE_VIP {
        return Discount::NONE;
    }

    let name = service_name.to_lowercase();

    if name.contains("refill") {
        if is_birthday_today {
            return Discount {
                amount: REFILL_BIRTHDAY_DISCOUNT,
                kind: Some(DISCOUNT_TYPE_BIRTHDAY),
            };
        }
        return Discount::vip(REFILL_VIP_DISCOUNT);
    }

    let full_set = name.contains("full set");

    if full_set && name.contains("mega volume") {
        return Discount::vip(FULL_SET_VOLUME_DISCOUNT);
    }
    if full_set && name.contains("volume") && !name.contains("mega") {
        return Discount::vip(FULL_SET_VOLUME_DISCOUNT);
    }
    if full_set && (name.contains("natural") || name.contains("hybrid")) {
        return Discount::vip(FULL_SET_CLASSIC_DISCOUNT);
    }

    Discount::NONE
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Quote {
    pub base_price: f64,
    pub price_multiplier: f64,
    pub discount: f64,
    pub discount_type: Option<&'static str>,
    pub final_price: f64,
}

/// Price breakdown for one booking. The final price is deliberately not
/// clamped at zero when the discount exceeds the multiplied base.
pub fn quote(
    base_price: f64,
    price_multiplier: f64,
    service_name: &str,
    role: &str,
    is_birthday_today: bool,
) -> Quote {
    let discount = vip_discount(service_name, role, is_birthday_today);
    let final_price = base_price * price_multiplier - discount.amount;
    Quote {
        base_price,
        price_multiplier,
        discount: discount.amount,
        discount_type: discount.kind,
        final_price,
    }
}

/// Month-and-day comparison against the stored `YYYY-MM-DD` birthday.
/// Unparseable or missing birthdays never match.
pub fn is_birthday_today(birthday: Option<&str>, today: NaiveDate) -> bool {
    let Some(raw) = birthday else {
        return false;
    };
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => date.month() == today.month() && date.day() == today.day(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ROLE_ADMIN, ROLE_CLIENT, ROLE_STAFF};

    #[test]
    fn non_vip_never_discounted() {
        for role in [ROLE_CLIENT, ROLE_STAFF, ROLE_ADMIN, "guest"] {
            let discount = vip_discount("Mega Volume Full Set", role, true);
            assert_eq!(discount.amount, 0.0);
            assert_eq!(discount.kind, None);
        }
    }

    #[test]
    fn refill_beats_full_set_rules() {
        // "Mega Volume Full Set Refill" matches both the refill rule and the
        // mega-volume rule; refill is evaluated first and wins.
        let discount = vip_discount("Mega Volume Full Set Refill", ROLE_VIP, false);
        assert_eq!(discount.amount, 10.0);
        assert_eq!(discount.kind, Some(DISCOUNT_TYPE_VIP));

        let birthday = vip_discount("Mega Volume Full Set Refill", ROLE_VIP, true);
        assert_eq!(birthday.amount, 20.0);
        assert_eq!(birthday.kind, Some(DISCOUNT_TYPE_BIRTHDAY));
    }

    #[test]
    fn full_set_tiers() {
        assert_eq!(vip_discount("Mega Volume Full Set", ROLE_VIP, false).amount, 30.0);
        assert_eq!(vip_discount("Volume Full Set", ROLE_VIP, false).amount, 30.0);
        assert_eq!(vip_discount("Natural Full Set", ROLE_VIP, false).amount, 20.0);
        assert_eq!(vip_discount("Hybrid Full Set", ROLE_VIP, false).amount, 20.0);
    }

    #[test]
    fn unmatched_service_falls_through() {
        let discount = vip_discount("Classic Full Set", ROLE_VIP, false);
        assert_eq!(discount.amount, 0.0);
        assert_eq!(discount.kind, None);

        // "Full set" alone without a volume/natural/hybrid qualifier.
        assert_eq!(vip_discount("Full Set", ROLE_VIP, false).amount, 0.0);
        assert_eq!(vip_discount("Brow Lamination", ROLE_VIP, true).amount, 0.0);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(vip_discount("hybrid FULL SET", ROLE_VIP, false).amount, 20.0);
        assert_eq!(vip_discount("LASH REFILL", ROLE_VIP, false).amount, 10.0);
    }

    #[test]
    fn quote_applies_multiplier_then_discount() {
        let q = quote(140.0, 1.25, "Hybrid Full Set", ROLE_VIP, false);
        assert_eq!(q.discount, 20.0);
        assert_eq!(q.discount_type, Some(DISCOUNT_TYPE_VIP));
        assert!((q.final_price - 155.0).abs() < f64::EPSILON);
    }

    #[test]
    fn quote_is_not_clamped_at_zero() {
        let q = quote(5.0, 1.0, "Volume Full Set", ROLE_VIP, false);
        assert_eq!(q.final_price, -25.0);
    }

    #[test]
    fn birthday_is_month_and_day_match() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert!(is_birthday_today(Some("1990-06-15"), today));
        assert!(!is_birthday_today(Some("1990-06-16"), today));
        assert!(!is_birthday_today(Some("not-a-date"), today));
        assert!(!is_birthday_today(None, today));
    }
}
