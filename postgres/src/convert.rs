//! Row types and column conversions.

use chrono::{DateTime, Utc};
use fairsale_core::catalog::{SaleSession, TicketType};
use fairsale_core::coupon::{Coupon, CouponDiscount};
use fairsale_core::error::StoreError;
use fairsale_core::ids::{
    CouponId, EventId, OrderId, OrderItemId, SessionId, TicketId, TicketTypeId, UserId,
};
use fairsale_core::membership::MembershipTier;
use fairsale_core::money::Money;
use fairsale_core::order::{CustomerInfo, Order, OrderItem, OrderStatus, Ticket, TicketStatus};
use fairsale_core::pricing::PriceBreakdown;
use fairsale_core::queue::{QueueEntry, QueueStatus, WaitingRoomConfig};
use uuid::Uuid;

pub(crate) fn money(cents: i64) -> Result<Money, StoreError> {
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| StoreError::Serialization(format!("negative amount: {cents}")))
}

pub(crate) fn cents(amount: Money) -> i64 {
    i64::try_from(amount.cents()).unwrap_or(i64::MAX)
}

pub(crate) fn count(value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Serialization(format!("negative count: {value}")))
}

pub(crate) fn int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn parse<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::Serialization(format!("invalid {what}: {value}")))
}

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    session_id: Uuid,
    user_id: Uuid,
    queue_number: i64,
    priority_score: i32,
    status: String,
    entered_at: DateTime<Utc>,
    activated_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    last_heartbeat: Option<DateTime<Utc>>,
}

impl TryFrom<EntryRow> for QueueEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: UserId::from_uuid(row.user_id),
            session_id: SessionId::from_uuid(row.session_id),
            queue_number: row.queue_number,
            priority_score: row.priority_score,
            status: parse::<QueueStatus>(&row.status, "queue status")?,
            entered_at: row.entered_at,
            activated_at: row.activated_at,
            expires_at: row.expires_at,
            completed_at: row.completed_at,
            last_heartbeat: row.last_heartbeat,
        })
    }
}

pub(crate) fn entries(rows: Vec<EntryRow>) -> Result<Vec<QueueEntry>, StoreError> {
    rows.into_iter().map(QueueEntry::try_from).collect()
}

#[derive(sqlx::FromRow)]
pub(crate) struct SessionRow {
    id: Uuid,
    event_id: Uuid,
    waiting_room_enabled: bool,
    max_capacity: Option<i32>,
    concurrent_purchase_limit: Option<i32>,
    queue_timeout_minutes: Option<i32>,
    sale_closes_at: Option<DateTime<Utc>>,
}

impl TryFrom<SessionRow> for SaleSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let waiting_room = match (
            row.max_capacity,
            row.concurrent_purchase_limit,
            row.queue_timeout_minutes,
        ) {
            (Some(max), Some(limit), Some(timeout)) => Some(WaitingRoomConfig {
                max_capacity: count(max)?,
                concurrent_purchase_limit: count(limit)?,
                queue_timeout_minutes: count(timeout)?,
                is_enabled: row.waiting_room_enabled,
            }),
            _ => None,
        };
        Ok(Self {
            id: SessionId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            waiting_room,
            sale_closes_at: row.sale_closes_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct TicketTypeRow {
    id: Uuid,
    session_id: Uuid,
    name: String,
    price_cents: i64,
    total_quantity: i32,
    sold_quantity: i32,
    sale_start_time: DateTime<Utc>,
    sale_end_time: DateTime<Utc>,
    premium_early_access_minutes: i32,
    min_per_order: i32,
    max_per_order: i32,
}

impl TryFrom<TicketTypeRow> for TicketType {
    type Error = StoreError;

    fn try_from(row: TicketTypeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TicketTypeId::from_uuid(row.id),
            session_id: SessionId::from_uuid(row.session_id),
            name: row.name,
            price: money(row.price_cents)?,
            total_quantity: count(row.total_quantity)?,
            sold_quantity: count(row.sold_quantity)?,
            sale_start_time: row.sale_start_time,
            sale_end_time: row.sale_end_time,
            premium_early_access_minutes: count(row.premium_early_access_minutes)?,
            min_per_order: count(row.min_per_order)?,
            max_per_order: count(row.max_per_order)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CouponRow {
    id: Uuid,
    code: String,
    discount_kind: String,
    discount_value: i64,
    max_discount_cents: Option<i64>,
    min_order_cents: Option<i64>,
    usage_limit: Option<i32>,
    per_user_limit: Option<i32>,
    used_count: i32,
    allowed_tiers: Vec<String>,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    is_active: bool,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = StoreError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        let discount = match row.discount_kind.as_str() {
            "percentage" => CouponDiscount::Percentage(
                u32::try_from(row.discount_value)
                    .map_err(|_| StoreError::Serialization("invalid percentage".to_string()))?,
            ),
            "fixed" => CouponDiscount::Fixed(money(row.discount_value)?),
            other => {
                return Err(StoreError::Serialization(format!("invalid discount kind: {other}")));
            }
        };
        Ok(Self {
            id: CouponId::from_uuid(row.id),
            code: row.code,
            discount,
            max_discount: row.max_discount_cents.map(money).transpose()?,
            min_order_amount: row.min_order_cents.map(money).transpose()?,
            usage_limit: row.usage_limit.map(count).transpose()?,
            per_user_limit: row.per_user_limit.map(count).transpose()?,
            used_count: count(row.used_count)?,
            allowed_tiers: row
                .allowed_tiers
                .iter()
                .map(|tier| parse::<MembershipTier>(tier, "membership tier"))
                .collect::<Result<_, _>>()?,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            is_active: row.is_active,
        })
    }
}

pub(crate) fn discount_columns(discount: CouponDiscount) -> (&'static str, i64) {
    match discount {
        CouponDiscount::Percentage(percent) => ("percentage", i64::from(percent)),
        CouponDiscount::Fixed(amount) => ("fixed", cents(amount)),
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    event_id: Uuid,
    session_id: Uuid,
    status: String,
    subtotal_cents: i64,
    membership_discount_cents: i64,
    coupon_discount_cents: i64,
    vat_cents: i64,
    total_cents: i64,
    coupon_id: Option<Uuid>,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    reserved_until: DateTime<Utc>,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    payment_transaction_id: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ItemRow {
    id: Uuid,
    ticket_type_id: Uuid,
    quantity: i32,
    unit_price_cents: i64,
}

#[derive(sqlx::FromRow)]
pub(crate) struct TicketRow {
    id: Uuid,
    order_item_id: Uuid,
    ticket_type_id: Uuid,
    code: String,
    status: String,
}

pub(crate) fn order(
    row: OrderRow,
    items: Vec<ItemRow>,
    tickets: Vec<TicketRow>,
) -> Result<Order, StoreError> {
    let items = items
        .into_iter()
        .map(|item| {
            Ok(OrderItem {
                id: OrderItemId::from_uuid(item.id),
                ticket_type_id: TicketTypeId::from_uuid(item.ticket_type_id),
                quantity: count(item.quantity)?,
                unit_price: money(item.unit_price_cents)?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    let tickets = tickets
        .into_iter()
        .map(|ticket| {
            Ok(Ticket {
                id: TicketId::from_uuid(ticket.id),
                order_item_id: OrderItemId::from_uuid(ticket.order_item_id),
                ticket_type_id: TicketTypeId::from_uuid(ticket.ticket_type_id),
                code: ticket.code,
                status: parse::<TicketStatus>(&ticket.status, "ticket status")?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(Order {
        id: OrderId::from_uuid(row.id),
        user_id: UserId::from_uuid(row.user_id),
        event_id: EventId::from_uuid(row.event_id),
        session_id: SessionId::from_uuid(row.session_id),
        status: parse::<OrderStatus>(&row.status, "order status")?,
        pricing: PriceBreakdown {
            subtotal: money(row.subtotal_cents)?,
            membership_discount: money(row.membership_discount_cents)?,
            coupon_discount: money(row.coupon_discount_cents)?,
            vat: money(row.vat_cents)?,
            total: money(row.total_cents)?,
        },
        coupon_id: row.coupon_id.map(CouponId::from_uuid),
        customer: CustomerInfo {
            name: row.customer_name,
            email: row.customer_email,
            phone: row.customer_phone,
        },
        items,
        tickets,
        reserved_until: row.reserved_until,
        created_at: row.created_at,
        paid_at: row.paid_at,
        payment_transaction_id: row.payment_transaction_id,
        cancelled_at: row.cancelled_at,
    })
}
