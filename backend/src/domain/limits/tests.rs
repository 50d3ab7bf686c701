//! Tests for limit evaluation.

use rstest::{fixture, rstest};
use uuid::Uuid;

use super::*;
use crate::domain::{CartLine, CategoryRef, Money, ProductRef};

struct Catalogue {
    meat: CategoryRef,
    frozen_meat: CategoryRef,
    baby: CategoryRef,
}

#[fixture]
fn catalogue() -> Catalogue {
    Catalogue {
        meat: CategoryRef {
            id: Uuid::new_v4(),
            name: "Meat".to_owned(),
        },
        frozen_meat: CategoryRef {
            id: Uuid::new_v4(),
            name: "Frozen Meat".to_owned(),
        },
        baby: CategoryRef {
            id: Uuid::new_v4(),
            name: "Diapers".to_owned(),
        },
    }
}

fn product(name: &str, category: &CategoryRef, subcategory: Option<&CategoryRef>) -> ProductRef {
    ProductRef {
        id: Uuid::new_v4(),
        name: name.to_owned(),
        category: category.clone(),
        subcategory: subcategory.cloned(),
        unit_price: Money::from_cents(500),
        ledger_bucket: None,
        available: true,
    }
}

fn line(product: &ProductRef, quantity: i32) -> CartLine {
    CartLine {
        product: product.clone(),
        quantity,
    }
}

fn limit(kind: LimitTargetKind, target: &CategoryRef, allowed: u32, scope: LimitScope) -> ProductLimit {
    ProductLimit {
        target: LimitTarget {
            kind,
            id: target.id,
            name: target.name.clone(),
        },
        allowed,
        scope,
    }
}

#[rstest]
fn category_limit_exceeded_reports_observed_and_allowed(catalogue: Catalogue) {
    let beef = product("Beef", &catalogue.meat, None);
    let cart = Cart::new(vec![line(&beef, 3)]);
    let limits = [limit(
        LimitTargetKind::Category,
        &catalogue.meat,
        2,
        LimitScope::PerOrder,
    )];

    let violations = evaluate(&cart, &Household::new(1, 0, 0), &limits);

    assert_eq!(violations.len(), 1);
    let violation = violations.first().expect("one violation");
    assert_eq!(violation.name, "Meat");
    assert_eq!(violation.observed, 3);
    assert_eq!(violation.allowed, 2);
    assert_eq!(violation.products, vec!["Beef".to_owned()]);
}

#[rstest]
fn subcategory_and_category_limits_are_independent(catalogue: Catalogue) {
    let frozen = product("Frozen Chicken", &catalogue.meat, Some(&catalogue.frozen_meat));
    let steak = product("Steak", &catalogue.meat, None);
    let cart = Cart::new(vec![line(&frozen, 1), line(&steak, 3)]);
    let limits = [
        limit(
            LimitTargetKind::Subcategory,
            &catalogue.frozen_meat,
            1,
            LimitScope::PerOrder,
        ),
        limit(LimitTargetKind::Category, &catalogue.meat, 5, LimitScope::PerOrder),
    ];

    assert!(evaluate(&cart, &Household::new(1, 0, 0), &limits).is_empty());
}

#[rstest]
fn both_levels_can_fail_in_one_pass(catalogue: Catalogue) {
    let frozen = product("Frozen Chicken", &catalogue.meat, Some(&catalogue.frozen_meat));
    let cart = Cart::new(vec![line(&frozen, 4)]);
    let limits = [
        limit(
            LimitTargetKind::Subcategory,
            &catalogue.frozen_meat,
            1,
            LimitScope::PerOrder,
        ),
        limit(LimitTargetKind::Category, &catalogue.meat, 2, LimitScope::PerOrder),
    ];

    let violations = evaluate(&cart, &Household::new(1, 0, 0), &limits);

    let kinds: Vec<_> = violations.iter().map(|v| v.target_kind).collect();
    assert_eq!(
        kinds,
        vec![LimitTargetKind::Category, LimitTargetKind::Subcategory]
    );
}

#[rstest]
#[case(0, 1, true)]
#[case(1, 1, false)]
#[case(2, 3, false)]
#[case(1, 2, true)]
fn per_infant_scales_with_infant_count(
    catalogue: Catalogue,
    #[case] infants: u32,
    #[case] quantity: i32,
    #[case] violated: bool,
) {
    let diapers = product("Diapers size 2", &catalogue.baby, None);
    let cart = Cart::new(vec![line(&diapers, quantity)]);
    let limits = [limit(
        LimitTargetKind::Category,
        &catalogue.baby,
        1,
        LimitScope::PerInfant,
    )];

    let violations = evaluate(&cart, &Household::new(2, 0, infants), &limits);

    assert_eq!(!violations.is_empty(), violated);
}

#[rstest]
fn zero_quantity_lines_are_ignored(catalogue: Catalogue) {
    let diapers = product("Diapers", &catalogue.baby, None);
    let cart = Cart::new(vec![line(&diapers, 0)]);
    let limits = [limit(
        LimitTargetKind::Category,
        &catalogue.baby,
        1,
        LimitScope::PerInfant,
    )];

    assert!(evaluate(&cart, &Household::new(2, 0, 0), &limits).is_empty());
}

#[rstest]
fn unlimited_products_are_unrestricted(catalogue: Catalogue) {
    let bread = product("Bread", &catalogue.baby, None);
    let cart = Cart::new(vec![line(&bread, 50)]);
    let limits = [limit(
        LimitTargetKind::Category,
        &catalogue.meat,
        1,
        LimitScope::PerOrder,
    )];

    assert!(evaluate(&cart, &Household::default(), &limits).is_empty());
}

#[rstest]
fn contributing_products_are_deduplicated_in_cart_order(catalogue: Catalogue) {
    let pork = product("Pork", &catalogue.meat, None);
    let beef = product("Beef", &catalogue.meat, None);
    let cart = Cart::new(vec![line(&pork, 1), line(&beef, 1), line(&pork, 1)]);
    let limits = [limit(
        LimitTargetKind::Category,
        &catalogue.meat,
        1,
        LimitScope::PerAdult,
    )];

    let violations = evaluate(&cart, &Household::new(2, 1, 0), &limits);

    let violation = violations.first().expect("violation");
    assert_eq!(violation.observed, 3);
    assert_eq!(violation.allowed, 2);
    assert_eq!(violation.products, vec!["Pork".to_owned(), "Beef".to_owned()]);
    assert_eq!(
        violation.message(),
        "Meat: 3 selected but only 2 allowed per adult (Pork, Beef)"
    );
}

#[rstest]
#[case(LimitScope::PerHousehold, Household::default(), 0)]
#[case(LimitScope::PerHousehold, Household::new(3, 2, 1), 1)]
#[case(LimitScope::PerChild, Household::new(3, 2, 1), 2)]
#[case(LimitScope::PerOrder, Household::default(), 1)]
fn scope_multipliers(#[case] scope: LimitScope, #[case] household: Household, #[case] expected: u32) {
    assert_eq!(scope.multiplier(&household), expected);
}
