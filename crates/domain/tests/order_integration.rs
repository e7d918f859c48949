//! Integration tests for order placement and the status state machine.
//!
//! These exercise the aggregate the way the order service drives it:
//! place, persist, then walk status changes.

use chrono::{Duration, Utc};
use domain::{
    CustomerId, DiscountTier, LineRequest, Money, Order, OrderError, OrderStatus, PlaceOrder,
    Product, ProductId, ShippingAddress, StatusOperation, StockMovement,
};

fn address() -> ShippingAddress {
    ShippingAddress {
        street_number: "221B".to_string(),
        street_name: "Baker Street".to_string(),
        city: "London".to_string(),
        state: "Greater London".to_string(),
        zip_code: "NW1 6XE".to_string(),
        country: "UK".to_string(),
    }
}

fn catalog() -> Vec<Product> {
    DiscountTier::all()
        .enumerate()
        .map(|(i, tier)| {
            Product::new(
                format!("SKU-{i:03}"),
                format!("Product {i}"),
                Money::from_cents(1_000 + 37 * i as i64),
                tier,
                25,
            )
        })
        .collect()
}

mod placement {
    use super::*;

    #[test]
    fn total_equals_sum_of_line_totals_for_every_tier() {
        let products = catalog();
        for quantity in [1, 2, 7, 25] {
            let lines = products
                .iter()
                .map(|p| LineRequest::new(p.id.clone(), quantity))
                .collect();
            let cmd = PlaceOrder::new(CustomerId::new(), address(), lines);

            let placed = Order::place(cmd, &products, Utc::now()).unwrap();
            let order = placed.order;

            assert_eq!(order.lines_total(), Some(order.total_price()));
            for line in order.lines() {
                let expected = line.discounted_unit_price.cents() * i64::from(quantity);
                assert_eq!(line.line_total.cents(), expected);
            }
            assert_eq!(placed.reservations.len(), products.len());
        }
    }

    #[test]
    fn shipping_address_and_notes_are_captured() {
        let cmd = PlaceOrder::new(
            CustomerId::new(),
            address(),
            vec![LineRequest::new("SKU-000", 1)],
        )
        .with_notes("Ring twice");

        let order = Order::place(cmd, &catalog(), Utc::now()).unwrap().order;
        assert_eq!(order.shipping_address(), &address());
        assert_eq!(order.notes(), Some("Ring twice"));
    }

    #[test]
    fn later_price_changes_do_not_touch_placed_lines() {
        let mut products = catalog();
        let cmd = PlaceOrder::new(
            CustomerId::new(),
            address(),
            vec![LineRequest::new("SKU-002", 2)],
        );
        let order = Order::place(cmd, &products, Utc::now()).unwrap().order;
        let frozen = order.lines()[0].clone();

        products[2].price = Money::from_dollars(500);
        products[2].discount = DiscountTier::NONE;

        assert_eq!(order.lines()[0], frozen);
        assert_eq!(order.total_price(), frozen.line_total);
    }

    #[test]
    fn stock_exactly_available_is_accepted() {
        let cmd = PlaceOrder::new(
            CustomerId::new(),
            address(),
            vec![LineRequest::new("SKU-000", 25)],
        );
        let placed = Order::place(cmd, &catalog(), Utc::now()).unwrap();
        assert_eq!(
            placed.reservations,
            vec![StockMovement::reserve(ProductId::new("SKU-000"), 25)]
        );
    }
}

mod lifecycle {
    use super::*;

    fn pending_order() -> Order {
        let cmd = PlaceOrder::new(
            CustomerId::new(),
            address(),
            vec![
                LineRequest::new("SKU-001", 6),
                LineRequest::new("SKU-003", 2),
            ],
        );
        Order::place(cmd, &catalog(), Utc::now()).unwrap().order
    }

    #[test]
    fn processing_complete_refund() {
        let mut order = pending_order();
        let t0 = order.created_at();

        let change = order.set_status(OrderStatus::Processing, t0 + Duration::seconds(1));
        order.apply(&change);
        let change = order.set_status(OrderStatus::Completed, t0 + Duration::seconds(2));
        order.apply(&change);
        let change = order.refund(t0 + Duration::seconds(3)).unwrap();
        order.apply(&change);

        assert_eq!(order.status(), OrderStatus::Refunded);
        assert_eq!(order.updated_at(), t0 + Duration::seconds(3));
        assert!(order.status().is_terminal());
    }

    #[test]
    fn canceled_order_cannot_be_canceled_again_or_refunded() {
        let mut order = pending_order();
        let change = order.admin_cancel(Utc::now()).unwrap();
        assert_eq!(change.operation, StatusOperation::AdminCancel);
        order.apply(&change);

        assert_eq!(
            order.admin_cancel(Utc::now()),
            Err(OrderError::InvalidStatusTransition {
                current: OrderStatus::Canceled,
                operation: StatusOperation::AdminCancel,
            })
        );
        assert_eq!(
            order.refund(Utc::now()),
            Err(OrderError::InvalidStatusTransition {
                current: OrderStatus::Canceled,
                operation: StatusOperation::Refund,
            })
        );
    }

    #[test]
    fn cancel_restock_mirrors_the_reservation() {
        let cmd = PlaceOrder::new(
            CustomerId::new(),
            address(),
            vec![
                LineRequest::new("SKU-004", 3),
                LineRequest::new("SKU-001", 1),
                LineRequest::new("SKU-004", 2),
            ],
        );
        let placed = Order::place(cmd, &catalog(), Utc::now()).unwrap();
        let change = placed.order.customer_cancel(Utc::now()).unwrap();

        let reserved: Vec<(ProductId, i64)> = placed
            .reservations
            .iter()
            .map(|m| (m.product_id.clone(), m.delta()))
            .collect();
        let released: Vec<(ProductId, i64)> = change
            .restock
            .iter()
            .map(|m| (m.product_id.clone(), -m.delta()))
            .collect();
        assert_eq!(reserved, released);
    }

    #[test]
    fn error_messages_carry_detail() {
        let err = OrderError::InsufficientStock {
            product_id: ProductId::new("SKU-001"),
            available: 4,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for SKU-001: available 4, requested 5"
        );

        let err = OrderError::InvalidStatusTransition {
            current: OrderStatus::Canceled,
            operation: StatusOperation::Refund,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition: cannot refund from Canceled status"
        );
    }
}
