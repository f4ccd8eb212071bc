// SPDX-License-Identifier: Apache-2.0

//! Order-book against gateway-charge matching. Pure functions over
//! already-loaded rows so the comparison logic is testable (and
//! benchable) without a database or a network.

use std::collections::HashMap;
use std::collections::HashSet;
use tradepost_gateways::ChargeRecord;
use tradepost_model::{CloseDiscrepancy, CloseTotals, DiscrepancyKind, Order, OrderStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub totals: CloseTotals,
    pub discrepancies: Vec<CloseDiscrepancy>,
}

/// Order-side money for the window. Refunded orders count into gross
/// and refunds both, so net is what the shop actually kept.
#[must_use]
pub fn order_totals(orders: &[Order]) -> (u64, i64, i64) {
    let mut gross = 0_i64;
    let mut refunds = 0_i64;
    for order in orders {
        gross = gross.saturating_add(order.total_cents);
        if order.status == OrderStatus::Refunded {
            refunds = refunds.saturating_add(order.total_cents);
        }
    }
    (orders.len() as u64, gross, refunds)
}

/// Drops repeated gateway rows. Providers re-send pages; the first row
/// per charge id wins, and the first charge per payment ref wins.
#[must_use]
pub fn dedup_charges(charges: &[ChargeRecord]) -> Vec<&ChargeRecord> {
    let mut seen_charge_ids: HashSet<&str> = HashSet::new();
    let mut seen_refs: HashSet<&str> = HashSet::new();
    charges
        .iter()
        .filter(|c| {
            seen_charge_ids.insert(c.charge_id.as_str()) && seen_refs.insert(c.payment_ref.as_str())
        })
        .collect()
}

/// Matches orders to charges by payment ref and totals both sides.
/// The discrepancy list comes back sorted so identical inputs always
/// produce identical rows.
#[must_use]
pub fn reconcile(orders: &[Order], charges: &[ChargeRecord]) -> Reconciliation {
    let charges = dedup_charges(charges);
    let (orders_count, gross_cents, refunds_cents) = order_totals(orders);
    let net_cents = gross_cents - refunds_cents;

    let mut gateway_gross_cents = 0_i64;
    let mut gateway_refunds_cents = 0_i64;
    let mut gateway_fees_cents = 0_i64;
    let mut by_ref: HashMap<&str, &ChargeRecord> = HashMap::with_capacity(charges.len());
    for charge in &charges {
        gateway_gross_cents = gateway_gross_cents.saturating_add(charge.amount_cents);
        gateway_refunds_cents = gateway_refunds_cents.saturating_add(charge.refunded_cents);
        gateway_fees_cents = gateway_fees_cents.saturating_add(charge.fee_cents);
        by_ref.insert(charge.payment_ref.as_str(), charge);
    }

    let mut matched_refs: HashSet<&str> = HashSet::new();
    let mut discrepancies: Vec<CloseDiscrepancy> = Vec::new();
    for order in orders {
        let Some(payment_ref) = order.payment_ref.as_deref() else {
            discrepancies.push(CloseDiscrepancy {
                kind: DiscrepancyKind::MissingCharge,
                order_id: Some(order.id.clone()),
                charge_id: None,
                detail: format!("order {} settled without a payment reference", order.id),
                amount_delta_cents: order.total_cents,
            });
            continue;
        };
        let Some(charge) = by_ref.get(payment_ref) else {
            discrepancies.push(CloseDiscrepancy {
                kind: DiscrepancyKind::MissingCharge,
                order_id: Some(order.id.clone()),
                charge_id: None,
                detail: format!("order {} has no gateway charge for {payment_ref}", order.id),
                amount_delta_cents: order.total_cents,
            });
            continue;
        };
        matched_refs.insert(payment_ref);
        if charge.amount_cents != order.total_cents {
            discrepancies.push(CloseDiscrepancy {
                kind: DiscrepancyKind::AmountMismatch,
                order_id: Some(order.id.clone()),
                charge_id: Some(charge.charge_id.clone()),
                detail: format!(
                    "order {} total {} differs from charge {} amount {}",
                    order.id, order.total_cents, charge.charge_id, charge.amount_cents
                ),
                amount_delta_cents: order.total_cents - charge.amount_cents,
            });
            continue;
        }
        let expected_refund = if order.status == OrderStatus::Refunded {
            order.total_cents
        } else {
            0
        };
        if charge.refunded_cents != expected_refund {
            discrepancies.push(CloseDiscrepancy {
                kind: DiscrepancyKind::AmountMismatch,
                order_id: Some(order.id.clone()),
                charge_id: Some(charge.charge_id.clone()),
                detail: format!(
                    "order {} expects refund {} but charge {} refunded {}",
                    order.id, expected_refund, charge.charge_id, charge.refunded_cents
                ),
                amount_delta_cents: expected_refund - charge.refunded_cents,
            });
        }
    }
    for charge in &charges {
        if !matched_refs.contains(charge.payment_ref.as_str()) {
            discrepancies.push(CloseDiscrepancy {
                kind: DiscrepancyKind::MissingOrder,
                order_id: None,
                charge_id: Some(charge.charge_id.clone()),
                detail: format!(
                    "charge {} ({}) has no matching order",
                    charge.charge_id, charge.payment_ref
                ),
                amount_delta_cents: charge.amount_cents - charge.refunded_cents,
            });
        }
    }
    discrepancies.sort_by_key(CloseDiscrepancy::sort_key);

    let gateway_net_cents = gateway_gross_cents - gateway_refunds_cents;
    Reconciliation {
        totals: CloseTotals {
            orders_count,
            gross_cents,
            refunds_cents,
            net_cents,
            gateway_gross_cents,
            gateway_refunds_cents,
            gateway_fees_cents,
            delta_cents: net_cents - gateway_net_cents,
        },
        discrepancies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradepost_model::{Currency, EmailAddress, OrderId};

    fn order(nonce: u64, status: OrderStatus, total: i64, payment_ref: Option<&str>) -> Order {
        Order {
            id: OrderId::mint(nonce),
            email: EmailAddress::parse("buyer@example.com").unwrap(),
            status,
            currency: Currency::Usd,
            total_cents: total,
            payment_ref: payment_ref.map(str::to_string),
            idempotency_key: None,
            lines: Vec::new(),
            created_at_ms: 1_000,
            updated_at_ms: 2_000,
            paid_at_ms: Some(2_000),
        }
    }

    fn charge(id: &str, payment_ref: &str, amount: i64, refunded: i64) -> ChargeRecord {
        ChargeRecord {
            charge_id: id.to_string(),
            payment_ref: payment_ref.to_string(),
            amount_cents: amount,
            refunded_cents: refunded,
            fee_cents: amount * 3 / 100,
            created_ms: 2_000,
        }
    }

    #[test]
    fn empty_day_balances_with_zeros() {
        let r = reconcile(&[], &[]);
        assert!(r.discrepancies.is_empty());
        assert_eq!(r.totals, CloseTotals::default());
    }

    #[test]
    fn matched_day_balances() {
        let orders = vec![
            order(1, OrderStatus::Paid, 1_800, Some("pi_1")),
            order(2, OrderStatus::Fulfilled, 2_500, Some("pi_2")),
            order(3, OrderStatus::Refunded, 6_100, Some("pi_3")),
        ];
        let charges = vec![
            charge("ch_1", "pi_1", 1_800, 0),
            charge("ch_2", "pi_2", 2_500, 0),
            charge("ch_3", "pi_3", 6_100, 6_100),
        ];
        let r = reconcile(&orders, &charges);
        assert!(r.discrepancies.is_empty());
        assert_eq!(r.totals.orders_count, 3);
        assert_eq!(r.totals.gross_cents, 10_400);
        assert_eq!(r.totals.refunds_cents, 6_100);
        assert_eq!(r.totals.net_cents, 4_300);
        assert_eq!(r.totals.gateway_gross_cents, 10_400);
        assert_eq!(r.totals.gateway_refunds_cents, 6_100);
        assert_eq!(r.totals.delta_cents, 0);
    }

    #[test]
    fn each_mismatch_kind_is_surfaced() {
        let orders = vec![
            order(1, OrderStatus::Paid, 1_800, Some("pi_short")),
            order(2, OrderStatus::Paid, 2_500, Some("pi_gone")),
        ];
        let charges = vec![
            charge("ch_1", "pi_short", 1_750, 0),
            charge("ch_9", "pi_stray", 900, 0),
        ];
        let r = reconcile(&orders, &charges);
        assert_eq!(r.discrepancies.len(), 3);
        // Sorted: missing_charge, missing_order, amount_mismatch.
        assert_eq!(r.discrepancies[0].kind, DiscrepancyKind::MissingCharge);
        assert_eq!(r.discrepancies[0].amount_delta_cents, 2_500);
        assert_eq!(r.discrepancies[1].kind, DiscrepancyKind::MissingOrder);
        assert_eq!(r.discrepancies[1].amount_delta_cents, 900);
        assert_eq!(r.discrepancies[2].kind, DiscrepancyKind::AmountMismatch);
        assert_eq!(r.discrepancies[2].amount_delta_cents, 50);
        assert_eq!(r.totals.delta_cents, 4_300 - 2_650);
    }

    #[test]
    fn refund_disagreement_is_a_mismatch() {
        let orders = vec![order(1, OrderStatus::Refunded, 6_100, Some("pi_1"))];
        let charges = vec![charge("ch_1", "pi_1", 6_100, 0)];
        let r = reconcile(&orders, &charges);
        assert_eq!(r.discrepancies.len(), 1);
        assert_eq!(r.discrepancies[0].kind, DiscrepancyKind::AmountMismatch);
        assert_eq!(r.discrepancies[0].amount_delta_cents, 6_100);
    }

    #[test]
    fn duplicate_gateway_rows_are_dropped() {
        let orders = vec![order(1, OrderStatus::Paid, 1_800, Some("pi_1"))];
        let charges = vec![
            charge("ch_1", "pi_1", 1_800, 0),
            charge("ch_1", "pi_1", 1_800, 0),
            charge("ch_1b", "pi_1", 1_800, 0),
        ];
        let r = reconcile(&orders, &charges);
        assert!(r.discrepancies.is_empty());
        assert_eq!(r.totals.gateway_gross_cents, 1_800);
    }

    #[test]
    fn missing_payment_ref_counts_as_missing_charge() {
        let orders = vec![order(1, OrderStatus::Paid, 1_800, None)];
        let r = reconcile(&orders, &[]);
        assert_eq!(r.discrepancies.len(), 1);
        assert_eq!(r.discrepancies[0].kind, DiscrepancyKind::MissingCharge);
    }

    #[test]
    fn identical_inputs_order_discrepancies_identically() {
        let orders = vec![
            order(2, OrderStatus::Paid, 100, Some("pi_b")),
            order(1, OrderStatus::Paid, 100, Some("pi_a")),
        ];
        let a = reconcile(&orders, &[]);
        let mut reversed = orders.clone();
        reversed.reverse();
        let b = reconcile(&reversed, &[]);
        assert_eq!(a.discrepancies, b.discrepancies);
    }
}
