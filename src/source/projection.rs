//! Order → ledger row projections.
//!
//! Column order of both rows is fixed by the ledger layout; the `form`
//! answers are positional (0 SNS channel, 1 SNS id, 2 passengers,
//! 3 boarding date, 4 boarding time, 5 flight, 6 take-off/landing time,
//! 7 other).

use chrono::{DateTime, FixedOffset};

use super::{Order, ProductItem};
use crate::config::{DispatchRowConfig, ProductIds};
use crate::ledger::LedgerRow;
use crate::status::OrderStatus;

/// Width of the order ledger row (B..AK).
pub const ORDER_ROW_WIDTH: usize = 36;

/// Width of the dispatch ledger row (B..R), status cell last.
pub const DISPATCH_ROW_WIDTH: usize = 17;

/// Service type shown on the dispatch ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductKind {
    Charter,
    OneWay,
    Unknown,
}

impl ProductKind {
    pub fn classify(prod_no: i64, ids: &ProductIds) -> Self {
        if prod_no == ids.charter || prod_no == ids.charter_route {
            Self::Charter
        } else if [ids.pickup, ids.sending, ids.pickup_route, ids.sending_route].contains(&prod_no)
        {
            Self::OneWay
        } else {
            Self::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Charter => "대절",
            Self::OneWay => "편도",
            Self::Unknown => "상품번호오류",
        }
    }
}

/// Pickup and drop-off details carried in the product options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route {
    pub start_location: String,
    pub start_address: String,
    pub end_location: String,
    pub end_address: String,
    pub start_airport: String,
    pub end_airport: String,
}

impl Route {
    /// Read the route out of the first option group. Only the `*_route`
    /// products carry one; everything else yields a blank route.
    pub fn from_item(item: &ProductItem, ids: &ProductIds) -> Self {
        let options = item.option_values();
        let opt = |i: usize| options.get(i).cloned().unwrap_or_default();

        if item.prod_no == ids.sending_route {
            // city → airport: [address, airport, place]
            Self {
                start_address: opt(0),
                start_location: opt(2),
                end_location: opt(1),
                start_airport: opt(1),
                ..Self::default()
            }
        } else if item.prod_no == ids.pickup_route {
            // airport → city: [place, airport, address]
            Self {
                start_location: opt(1),
                end_location: opt(0),
                end_address: opt(2),
                end_airport: opt(1),
                ..Self::default()
            }
        } else if item.prod_no == ids.charter_route {
            Self {
                start_location: opt(0),
                start_address: opt(1),
                end_location: opt(2),
                end_address: opt(3),
                ..Self::default()
            }
        } else {
            Self::default()
        }
    }
}

fn local_time(order: &Order, tz: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::from_timestamp(order.order_time, 0).map(|t| t.with_timezone(tz))
}

/// Payment date and time (`YYYY-MM-DD`, `HH:MM:SS`) in the local zone.
pub fn payment_date_time(order: &Order, tz: &FixedOffset) -> (String, String) {
    match local_time(order, tz) {
        Some(t) => (
            t.format("%Y-%m-%d").to_string(),
            t.format("%H:%M:%S").to_string(),
        ),
        None => (String::new(), String::new()),
    }
}

/// The label shown in the ledger's number column.
pub fn row_label(line: i64, row_label_offset: i64) -> String {
    (line - row_label_offset).to_string()
}

pub struct ProjectionContext<'a> {
    pub products: &'a ProductIds,
    pub dispatch: &'a DispatchRowConfig,
    pub row_label_offset: i64,
    pub timezone: FixedOffset,
}

impl ProjectionContext<'_> {
    fn route(&self, order: &Order) -> Route {
        order
            .product_item()
            .map(|item| Route::from_item(item, self.products))
            .unwrap_or_default()
    }

    /// Order ledger row. Cells that operators fill in by hand carry their
    /// column heading as a placeholder.
    pub fn order_row(&self, order: &Order, line: i64, status: OrderStatus) -> LedgerRow {
        let (pay_date, pay_time) = payment_date_time(order, &self.timezone);
        let route = self.route(order);
        let prod_name = order
            .product_item()
            .map(|item| item.prod_name.clone())
            .unwrap_or_default();
        let f = |i: usize| order.form_value(i).to_string();

        LedgerRow::new(vec![
            row_label(line, self.row_label_offset),
            status.label().to_string(),
            "구입채널".to_string(),
            order.orderer.member_code.clone(),
            order.orderer.name.clone(),
            order.orderer.email.clone(),
            order.orderer.name.clone(),
            order.orderer.email.clone(),
            order.orderer.call.clone(),
            order.order_no.clone(),
            pay_date,
            pay_time,
            format!(
                "{}({})",
                order.payment.total_price, order.payment.price_currency
            ),
            prod_name,
            route.start_location,
            "출발지 위치명(관리자)".to_string(),
            route.start_address,
            "출발지주소(관리자)".to_string(),
            route.end_airport,
            route.end_location,
            "도착지위치명(관리자)".to_string(),
            route.end_address,
            "도착지주소(관리자)".to_string(),
            route.start_airport,
            f(0),
            f(1),
            f(2),
            f(3),
            f(4),
            "(변경)탑승시간".to_string(),
            f(5),
            f(6),
            f(7),
            "취소사유".to_string(),
            "취소일자".to_string(),
            "취소시간".to_string(),
        ])
    }

    /// Dispatch ledger row. The trailing status cell starts blank, which
    /// reads as the initial dispatch status.
    pub fn dispatch_row(&self, order: &Order, line: i64) -> LedgerRow {
        let (pay_date, pay_time) = payment_date_time(order, &self.timezone);
        let route = self.route(order);
        let kind = order
            .product_item()
            .map(|item| ProductKind::classify(item.prod_no, self.products))
            .unwrap_or(ProductKind::Unknown);

        LedgerRow::new(vec![
            row_label(line, self.row_label_offset),
            order.order_no.clone(),
            pay_date,
            pay_time,
            String::new(),
            String::new(),
            self.dispatch.requester_name.clone(),
            self.dispatch.contact_phone.clone(),
            kind.label().to_string(),
            "-".to_string(),
            order.orderer.name.clone(),
            self.dispatch.contact_phone.clone(),
            format!("{} {}", order.form_value(3), order.form_value(4)),
            format!("{} {}", route.start_location, route.start_address),
            format!("{} {}", route.end_location, route.end_address),
            order.form_value(2).to_string(),
            String::new(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FormField, ProductOption, ProductOrder};

    fn item(prod_no: i64, options: &[&str]) -> ProductItem {
        ProductItem {
            prod_no,
            prod_name: "Airport ride".into(),
            options: vec![vec![ProductOption {
                option_code: "route".into(),
                value_name_list: options.iter().map(|s| s.to_string()).collect(),
            }]],
            ..ProductItem::default()
        }
    }

    fn order(prod_no: i64, options: &[&str]) -> Order {
        let answers = [
            "kakao", "kim01", "3", "2024-05-20", "09:30", "KE123", "11:00", "baby seat",
        ];
        let mut order = Order {
            order_no: "O-100".into(),
            // 2024-05-12 01:00:00 UTC
            order_time: 1_715_475_600,
            form: answers
                .iter()
                .map(|v| FormField {
                    kind: "text".into(),
                    title: String::new(),
                    value: v.to_string(),
                })
                .collect(),
            ..Order::default()
        };
        order.orderer.name = "Kim".into();
        order.orderer.email = "kim@example.com".into();
        order.orderer.call = "010-0000-0000".into();
        order.orderer.member_code = "m1".into();
        order.payment.total_price = "55000".into();
        order.payment.price_currency = "KRW".into();
        order.with_product_order(ProductOrder {
            order_no: "O-100".into(),
            items: vec![item(prod_no, options)],
            ..ProductOrder::default()
        })
    }

    fn context<'a>(ids: &'a ProductIds, dispatch: &'a DispatchRowConfig) -> ProjectionContext<'a> {
        ProjectionContext {
            products: ids,
            dispatch,
            row_label_offset: 3,
            timezone: FixedOffset::east_opt(9 * 3600).unwrap(),
        }
    }

    #[test]
    fn classify_products() {
        let ids = ProductIds::default();
        assert_eq!(ProductKind::classify(133, &ids), ProductKind::Charter);
        assert_eq!(ProductKind::classify(148, &ids), ProductKind::Charter);
        for no in [83, 122, 146, 147] {
            assert_eq!(ProductKind::classify(no, &ids), ProductKind::OneWay);
        }
        assert_eq!(ProductKind::classify(1, &ids).label(), "상품번호오류");
    }

    #[test]
    fn routes_per_product() {
        let ids = ProductIds::default();

        let sending = Route::from_item(&item(147, &["Gangnam 1", "ICN", "Hotel A"]), &ids);
        assert_eq!(sending.start_address, "Gangnam 1");
        assert_eq!(sending.start_location, "Hotel A");
        assert_eq!(sending.end_location, "ICN");
        assert_eq!(sending.start_airport, "ICN");
        assert_eq!(sending.end_address, "");

        let pickup = Route::from_item(&item(146, &["Hotel B", "GMP", "Mapo 2"]), &ids);
        assert_eq!(pickup.start_location, "GMP");
        assert_eq!(pickup.end_location, "Hotel B");
        assert_eq!(pickup.end_address, "Mapo 2");
        assert_eq!(pickup.end_airport, "GMP");

        let charter = Route::from_item(&item(148, &["A", "a st", "B", "b st"]), &ids);
        assert_eq!(charter.start_location, "A");
        assert_eq!(charter.end_address, "b st");

        assert_eq!(Route::from_item(&item(133, &["x"]), &ids), Route::default());
        assert_eq!(Route::from_item(&item(147, &[]), &ids).start_location, "");
    }

    #[test]
    fn order_row_layout() {
        let ids = ProductIds::default();
        let dispatch = DispatchRowConfig::default();
        let row = context(&ids, &dispatch).order_row(
            &order(147, &["Gangnam 1", "ICN", "Hotel A"]),
            4,
            OrderStatus::Receipt,
        );

        assert_eq!(row.len(), ORDER_ROW_WIDTH);
        assert_eq!(row.cell(0), "1");
        assert_eq!(row.cell(1), "접수");
        assert_eq!(row.cell(9), "O-100");
        assert_eq!(row.cell(10), "2024-05-12");
        assert_eq!(row.cell(11), "10:00:00");
        assert_eq!(row.cell(12), "55000(KRW)");
        assert_eq!(row.cell(14), "Hotel A");
        assert_eq!(row.cell(23), "ICN");
        assert_eq!(row.cell(24), "kakao");
        assert_eq!(row.cell(26), "3");
        assert_eq!(row.cell(30), "KE123");
        assert_eq!(row.cell(32), "baby seat");
        assert_eq!(row.cell(35), "취소시간");
    }

    #[test]
    fn dispatch_row_layout() {
        let ids = ProductIds::default();
        let dispatch = DispatchRowConfig {
            requester_name: "Desk".into(),
            contact_phone: "010-1111-2222".into(),
        };
        let row = context(&ids, &dispatch).dispatch_row(&order(148, &["A", "a st", "B", "b st"]), 7);

        assert_eq!(row.len(), DISPATCH_ROW_WIDTH);
        assert_eq!(row.cell(0), "4");
        assert_eq!(row.cell(1), "O-100");
        assert_eq!(row.cell(6), "Desk");
        assert_eq!(row.cell(8), "대절");
        assert_eq!(row.cell(10), "Kim");
        assert_eq!(row.cell(11), "010-1111-2222");
        assert_eq!(row.cell(12), "2024-05-20 09:30");
        assert_eq!(row.cell(13), "A a st");
        assert_eq!(row.cell(14), "B b st");
        assert_eq!(row.cell(15), "3");
        assert_eq!(row.cell(16), "");
    }

    #[test]
    fn order_without_product_still_projects() {
        let ids = ProductIds::default();
        let dispatch = DispatchRowConfig::default();
        let mut bare = order(147, &[]);
        bare.product_order = None;
        let ctx = context(&ids, &dispatch);
        assert_eq!(ctx.order_row(&bare, 5, OrderStatus::Receipt).cell(13), "");
        assert_eq!(ctx.dispatch_row(&bare, 5).cell(8), "상품번호오류");
    }
}
