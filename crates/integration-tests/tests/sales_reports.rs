//! Sales reports: aggregation, CSV export and the period the back office
//! resolves from its query string.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::{NaiveDate, TimeDelta};

use pizzaria_admin::routes::reports::{PeriodQuery, csv_filename};
use pizzaria_core::report::{ReportItem, ReportOrder, SalesReport, orders_csv};
use pizzaria_core::{Fulfillment, Money, OrderId, OrderStatus, PaymentMethod};
use pizzaria_integration_tests::evening;

fn order(
    id: i32,
    hours_later: i64,
    status: OrderStatus,
    payment_method: PaymentMethod,
    total_cents: i64,
) -> ReportOrder {
    ReportOrder {
        order_id: OrderId::new(id),
        created_at: evening() + TimeDelta::hours(hours_later),
        customer_name: format!("Cliente {id}"),
        status,
        fulfillment: Fulfillment::Delivery,
        payment_method,
        subtotal: Money::from_cents(total_cents - 500),
        delivery_fee: Money::from_cents(500),
        discount: Money::ZERO,
        total: Money::from_cents(total_cents),
    }
}

fn item(order_id: i32, name: &str, quantity: i32, cents: i64) -> ReportItem {
    ReportItem {
        order_id: OrderId::new(order_id),
        product_name: name.to_string(),
        quantity,
        line_total: Money::from_cents(cents),
    }
}

#[test]
fn test_cancelled_orders_stay_out_of_revenue() {
    let orders = [
        order(1, 0, OrderStatus::Finished, PaymentMethod::Pix, 6000),
        order(2, 1, OrderStatus::Finished, PaymentMethod::Cash, 4000),
        order(3, 1, OrderStatus::Cancelled, PaymentMethod::Pix, 9900),
        // 01:00 local on the next day
        order(4, 6, OrderStatus::Pending, PaymentMethod::Pix, 3000),
    ];
    let items = [
        item(1, "Calabresa", 1, 5500),
        item(2, "Calabresa", 1, 3500),
        item(3, "Camarão", 5, 9400),
        item(4, "Guaraná 2L", 2, 2500),
    ];

    let report = SalesReport::build(&orders, &items);

    assert_eq!(report.order_count, 3);
    assert_eq!(report.cancelled_count, 1);
    assert_eq!(report.revenue, Money::from_cents(13000));
    assert_eq!(report.delivery_fees, Money::from_cents(1500));

    assert_eq!(report.by_payment[0].payment_method, PaymentMethod::Pix);
    assert_eq!(report.by_payment[0].revenue, Money::from_cents(9000));

    let days: Vec<NaiveDate> = report.by_day.iter().map(|d| d.date).collect();
    assert_eq!(
        days,
        vec![
            NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 11).unwrap(),
        ]
    );

    assert!(report.top_products.iter().all(|p| p.product_name != "Camarão"));
    assert_eq!(report.top_products[0].quantity, 2);
}

#[test]
fn test_csv_export_is_local_time_and_quoted() {
    let mut first = order(7, 0, OrderStatus::Finished, PaymentMethod::CreditCard, 4550);
    first.customer_name = "Silva, \"Zé\"".to_string();

    let csv = orders_csv(&[first]);
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "pedido,data,cliente,status,tipo,pagamento,subtotal,taxa_entrega,desconto,total"
    );
    assert_eq!(
        lines.next().unwrap(),
        "7,2024-05-10 19:00,\"Silva, \"\"Zé\"\"\",finalizado,entrega,credito,40.50,5.00,0.00,45.50"
    );
    assert!(lines.next().is_none());
}

#[test]
fn test_report_period_is_whole_local_days() {
    let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
    let query = PeriodQuery {
        from: NaiveDate::from_ymd_opt(2024, 5, 1),
        to: None,
    };

    let period = query.resolve(today).unwrap();
    assert_eq!(period.to, today);
    assert_eq!(period.start.to_rfc3339(), "2024-05-01T03:00:00+00:00");
    assert_eq!(period.end.to_rfc3339(), "2024-05-11T03:00:00+00:00");
    assert_eq!(csv_filename(&period), "pedidos-2024-05-01-a-2024-05-10.csv");

    let reversed = PeriodQuery {
        from: NaiveDate::from_ymd_opt(2024, 5, 11),
        to: Some(today),
    };
    assert!(reversed.resolve(today).is_err());
}
