//! Sales report and CSV export.
//!
//! Periods are whole days in store local time, both ends inclusive:
//! `?from=2024-05-01&to=2024-05-31`. Either end defaults to today.

use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use pizzaria_core::report::{SalesReport, brasilia, orders_csv};

use crate::db::ReportRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireManager;
use crate::state::AppState;

/// Longest period a report may cover.
const MAX_PERIOD_DAYS: i64 = 366;

/// Report period as requested.
#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// A resolved period: local dates plus the UTC half-open range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(skip)]
    pub start: DateTime<Utc>,
    #[serde(skip)]
    pub end: DateTime<Utc>,
}

/// Report with the period it covers.
#[derive(Debug, Serialize)]
pub struct SalesReportResponse {
    pub period: Period,
    pub report: SalesReport,
}

fn local_midnight(date: NaiveDate) -> Result<DateTime<Utc>> {
    date.and_time(NaiveTime::MIN)
        .and_local_timezone(brasilia())
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| AppError::BadRequest(format!("data inválida: {date}")))
}

impl PeriodQuery {
    /// Resolve against `today` (store local date).
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for reversed or overly long periods.
    pub fn resolve(&self, today: NaiveDate) -> Result<Period> {
        let from = self.from.unwrap_or(today);
        let to = self.to.unwrap_or(today);
        if from > to {
            return Err(AppError::BadRequest(
                "data inicial depois da data final".to_string(),
            ));
        }
        if (to - from).num_days() >= MAX_PERIOD_DAYS {
            return Err(AppError::BadRequest(format!(
                "período máximo de {MAX_PERIOD_DAYS} dias"
            )));
        }

        let next_day = to
            .checked_add_signed(TimeDelta::days(1))
            .ok_or_else(|| AppError::BadRequest(format!("data inválida: {to}")))?;
        Ok(Period {
            from,
            to,
            start: local_midnight(from)?,
            end: local_midnight(next_day)?,
        })
    }
}

fn today() -> NaiveDate {
    Utc::now().with_timezone(&brasilia()).date_naive()
}

/// Attachment name for an exported period.
#[must_use]
pub fn csv_filename(period: &Period) -> String {
    if period.from == period.to {
        format!("pedidos-{}.csv", period.from)
    } else {
        format!("pedidos-{}-a-{}.csv", period.from, period.to)
    }
}

/// Aggregated sales for the period.
#[instrument(skip(state, _admin))]
pub async fn sales(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<SalesReportResponse>> {
    let period = query.resolve(today())?;
    let repo = ReportRepository::new(state.pool());
    let orders = repo.orders(period.start, period.end).await?;
    let items = repo.items(period.start, period.end).await?;

    Ok(Json(SalesReportResponse {
        period,
        report: SalesReport::build(&orders, &items),
    }))
}

/// Orders of the period as a CSV attachment.
#[instrument(skip(state, _admin))]
pub async fn orders_csv_export(
    State(state): State<AppState>,
    RequireManager(_admin): RequireManager,
    Query(query): Query<PeriodQuery>,
) -> Result<impl IntoResponse> {
    let period = query.resolve(today())?;
    let orders = ReportRepository::new(state.pool())
        .orders(period.start, period.end)
        .await?;
    tracing::info!(rows = orders.len(), "orders exported");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", csv_filename(&period)),
            ),
        ],
        orders_csv(&orders),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_covers_whole_local_days() {
        let query = PeriodQuery {
            from: Some(date(2024, 5, 1)),
            to: Some(date(2024, 5, 31)),
        };
        let period = query.resolve(date(2024, 6, 10)).unwrap();
        assert_eq!(period.start.to_rfc3339(), "2024-05-01T03:00:00+00:00");
        assert_eq!(period.end.to_rfc3339(), "2024-06-01T03:00:00+00:00");
    }

    #[test]
    fn test_missing_dates_default_to_today() {
        let period = PeriodQuery::default().resolve(date(2024, 6, 10)).unwrap();
        assert_eq!(period.from, date(2024, 6, 10));
        assert_eq!(period.to, date(2024, 6, 10));
        assert_eq!(period.end - period.start, TimeDelta::days(1));
    }

    #[test]
    fn test_reversed_and_long_periods_are_rejected() {
        let reversed = PeriodQuery {
            from: Some(date(2024, 6, 2)),
            to: Some(date(2024, 6, 1)),
        };
        assert!(reversed.resolve(date(2024, 6, 10)).is_err());

        let long = PeriodQuery {
            from: Some(date(2023, 1, 1)),
            to: Some(date(2024, 6, 1)),
        };
        assert!(long.resolve(date(2024, 6, 10)).is_err());
    }

    #[test]
    fn test_csv_filename() {
        let one_day = PeriodQuery::default().resolve(date(2024, 6, 10)).unwrap();
        assert_eq!(csv_filename(&one_day), "pedidos-2024-06-10.csv");

        let range = PeriodQuery {
            from: Some(date(2024, 6, 1)),
            to: None,
        }
        .resolve(date(2024, 6, 10))
        .unwrap();
        assert_eq!(csv_filename(&range), "pedidos-2024-06-01-a-2024-06-10.csv");
    }
}
