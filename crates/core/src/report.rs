//! Sales report aggregation and CSV export.
//!
//! Days are bucketed in Brasília time (UTC-3, no daylight saving).

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::{Fulfillment, Money, OrderId, OrderStatus, PaymentMethod};

/// Maximum rows in the top-products ranking.
pub const TOP_PRODUCTS: usize = 10;

const BRASILIA_UTC_OFFSET_SECS: i32 = 3 * 3600;

/// An order as loaded for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct ReportOrder {
    /// Order id.
    pub order_id: OrderId,
    /// When it was placed.
    pub created_at: DateTime<Utc>,
    /// Customer name.
    pub customer_name: String,
    /// Current status.
    pub status: OrderStatus,
    /// Delivery or pickup.
    pub fulfillment: Fulfillment,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Items total.
    pub subtotal: Money,
    /// Delivery fee.
    pub delivery_fee: Money,
    /// Discount applied.
    pub discount: Money,
    /// Amount charged.
    pub total: Money,
}

/// Quantity sold per product line, as loaded for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct ReportItem {
    /// Order the item belongs to.
    pub order_id: OrderId,
    /// Product name at purchase time.
    pub product_name: String,
    /// Units.
    pub quantity: i32,
    /// Line total.
    pub line_total: Money,
}

/// Revenue for one payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentBreakdown {
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Orders paid this way.
    pub orders: usize,
    /// Revenue.
    pub revenue: Money,
}

/// Revenue for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyRevenue {
    /// Local date.
    pub date: NaiveDate,
    /// Orders placed.
    pub orders: usize,
    /// Revenue.
    pub revenue: Money,
}

/// Units and revenue for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSales {
    /// Product name.
    pub product_name: String,
    /// Units sold.
    pub quantity: i64,
    /// Revenue.
    pub revenue: Money,
}

/// Aggregated sales over a period. Cancelled orders are counted separately
/// and excluded from every revenue figure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesReport {
    /// Non-cancelled orders.
    pub order_count: usize,
    /// Cancelled orders.
    pub cancelled_count: usize,
    /// Sum of totals of non-cancelled orders.
    pub revenue: Money,
    /// Sum of delivery fees of non-cancelled orders.
    pub delivery_fees: Money,
    /// `revenue / order_count`, zero when there are no orders.
    pub average_ticket: Money,
    /// Revenue per payment method, highest first.
    pub by_payment: Vec<PaymentBreakdown>,
    /// Revenue per day, oldest first.
    pub by_day: Vec<DailyRevenue>,
    /// Best-selling products by units, at most [`TOP_PRODUCTS`].
    pub top_products: Vec<ProductSales>,
}

impl SalesReport {
    /// Aggregate orders and their items.
    #[must_use]
    pub fn build(orders: &[ReportOrder], items: &[ReportItem]) -> Self {
        let offset = brasilia();
        let mut cancelled = Vec::new();
        let mut revenue = Money::ZERO;
        let mut delivery_fees = Money::ZERO;
        let mut payments: HashMap<PaymentMethod, (usize, Money)> = HashMap::new();
        let mut days: BTreeMap<NaiveDate, (usize, Money)> = BTreeMap::new();
        let mut order_count = 0;

        for order in orders {
            if order.status == OrderStatus::Cancelled {
                cancelled.push(order.order_id);
                continue;
            }
            order_count += 1;
            revenue += order.total;
            delivery_fees += order.delivery_fee;

            let payment = payments.entry(order.payment_method).or_default();
            payment.0 += 1;
            payment.1 += order.total;

            let day = days
                .entry(order.created_at.with_timezone(&offset).date_naive())
                .or_default();
            day.0 += 1;
            day.1 += order.total;
        }

        let average_ticket = u32::try_from(order_count)
            .ok()
            .filter(|&n| n > 0)
            .map_or(Money::ZERO, |n| {
                Money::new(revenue.amount() / rust_decimal::Decimal::from(n))
            });

        let mut by_payment: Vec<PaymentBreakdown> = payments
            .into_iter()
            .map(|(payment_method, (orders, revenue))| PaymentBreakdown {
                payment_method,
                orders,
                revenue,
            })
            .collect();
        by_payment.sort_by(|a, b| {
            b.revenue
                .cmp(&a.revenue)
                .then_with(|| a.payment_method.as_str().cmp(b.payment_method.as_str()))
        });

        let by_day = days
            .into_iter()
            .map(|(date, (orders, revenue))| DailyRevenue {
                date,
                orders,
                revenue,
            })
            .collect();

        let mut products: HashMap<&str, (i64, Money)> = HashMap::new();
        for item in items.iter().filter(|i| !cancelled.contains(&i.order_id)) {
            let entry = products.entry(item.product_name.as_str()).or_default();
            entry.0 += i64::from(item.quantity);
            entry.1 += item.line_total;
        }
        let mut top_products: Vec<ProductSales> = products
            .into_iter()
            .map(|(name, (quantity, revenue))| ProductSales {
                product_name: name.to_owned(),
                quantity,
                revenue,
            })
            .collect();
        top_products.sort_by(|a, b| {
            b.quantity
                .cmp(&a.quantity)
                .then_with(|| b.revenue.cmp(&a.revenue))
                .then_with(|| a.product_name.cmp(&b.product_name))
        });
        top_products.truncate(TOP_PRODUCTS);

        Self {
            order_count,
            cancelled_count: cancelled.len(),
            revenue,
            delivery_fees,
            average_ticket,
            by_payment,
            by_day,
            top_products,
        }
    }
}

/// The store's local offset (UTC-3).
#[must_use]
pub fn brasilia() -> FixedOffset {
    FixedOffset::west_opt(BRASILIA_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// `dd/mm/yyyy HH:MM` in store local time.
#[must_use]
pub fn local_datetime(at: DateTime<Utc>) -> String {
    at.with_timezone(&brasilia()).format("%d/%m/%Y %H:%M").to_string()
}

/// Render orders as CSV (comma separated, RFC 4180 quoting, header row).
#[must_use]
pub fn orders_csv(orders: &[ReportOrder]) -> String {
    let offset = brasilia();
    let mut csv = String::from(
        "pedido,data,cliente,status,tipo,pagamento,subtotal,taxa_entrega,desconto,total\n",
    );
    for order in orders {
        let _ = writeln!(
            csv,
            "{},{},{},{},{},{},{},{},{},{}",
            order.order_id,
            order
                .created_at
                .with_timezone(&offset)
                .format("%Y-%m-%d %H:%M"),
            escape_csv(&order.customer_name),
            order.status.as_str(),
            order.fulfillment.as_str(),
            order.payment_method.as_str(),
            order.subtotal.to_plain_string(),
            order.delivery_fee.to_plain_string(),
            order.discount.to_plain_string(),
            order.total.to_plain_string(),
        );
    }
    csv
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn order(id: i32, hour_utc: u32, day: u32, status: OrderStatus, method: PaymentMethod, cents: i64) -> ReportOrder {
        ReportOrder {
            order_id: OrderId::new(id),
            created_at: Utc.with_ymd_and_hms(2024, 5, day, hour_utc, 0, 0).unwrap(),
            customer_name: format!("Cliente {id}"),
            status,
            fulfillment: Fulfillment::Delivery,
            payment_method: method,
            subtotal: Money::from_cents(cents - 500),
            delivery_fee: Money::from_cents(500),
            discount: Money::ZERO,
            total: Money::from_cents(cents),
        }
    }

    fn item(order: i32, name: &str, quantity: i32, cents: i64) -> ReportItem {
        ReportItem {
            order_id: OrderId::new(order),
            product_name: name.to_owned(),
            quantity,
            line_total: Money::from_cents(cents),
        }
    }

    #[test]
    fn test_report_excludes_cancelled_revenue() {
        let orders = [
            order(1, 22, 1, OrderStatus::Finished, PaymentMethod::Pix, 5000),
            order(2, 23, 1, OrderStatus::Finished, PaymentMethod::Cash, 3000),
            order(3, 23, 1, OrderStatus::Cancelled, PaymentMethod::Pix, 9900),
            // 02:00 UTC on the 2nd is still the 1st in Brasília.
            order(4, 2, 2, OrderStatus::Preparing, PaymentMethod::Pix, 4000),
        ];
        let items = [
            item(1, "Calabresa", 1, 4500),
            item(2, "Mussarela", 2, 2500),
            item(3, "Calabresa", 5, 9400),
            item(4, "Calabresa", 1, 3500),
        ];
        let report = SalesReport::build(&orders, &items);

        assert_eq!(report.order_count, 3);
        assert_eq!(report.cancelled_count, 1);
        assert_eq!(report.revenue, Money::from_cents(12_000));
        assert_eq!(report.average_ticket, Money::from_cents(4000));
        assert_eq!(report.by_payment[0].payment_method, PaymentMethod::Pix);
        assert_eq!(report.by_payment[0].revenue, Money::from_cents(9000));
        assert_eq!(report.by_day.len(), 1);
        assert_eq!(report.by_day[0].orders, 3);
        assert_eq!(report.top_products[0].quantity, 2);
        assert_eq!(report.delivery_fees, Money::from_cents(1500));
    }

    #[test]
    fn test_empty_report() {
        let report = SalesReport::build(&[], &[]);
        assert_eq!(report.order_count, 0);
        assert_eq!(report.average_ticket, Money::ZERO);
        assert!(report.by_day.is_empty());
    }

    #[test]
    fn test_csv_escaping_and_format() {
        let mut o = order(7, 22, 1, OrderStatus::Finished, PaymentMethod::CreditCard, 4590);
        o.customer_name = "Silva, \"Zé\"".to_owned();
        let csv = orders_csv(&[o]);
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("pedido,data,cliente"));
        assert_eq!(
            lines.next().unwrap(),
            "7,2024-05-01 19:00,\"Silva, \"\"Zé\"\"\",finalizado,entrega,credito,40.90,5.00,0.00,45.90"
        );
    }

    #[test]
    fn test_local_datetime_is_utc_minus_three() {
        let at = Utc.with_ymd_and_hms(2024, 5, 2, 2, 30, 0).unwrap();
        assert_eq!(local_datetime(at), "01/05/2024 23:30");
    }
}
