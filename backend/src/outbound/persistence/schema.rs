//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. When a
//! migration changes the schema, regenerate with `diesel print-schema` or
//! update by hand.

diesel::table! {
    /// One row per participant account: household and standard budget.
    ///
    /// `balance_version` increments on every committed order and fences
    /// stale reservations.
    ledgers (account_id) {
        account_id -> Uuid,
        adults -> Int4,
        children -> Int4,
        infants -> Int4,
        total_budget_cents -> Int8,
        used_budget_cents -> Int8,
        balance_version -> Int8,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Category-specific budgets, for example hygiene.
    sub_ledgers (account_id, bucket) {
        account_id -> Uuid,
        bucket -> Text,
        total_cents -> Int8,
        used_cents -> Int8,
    }
}

diesel::table! {
    /// Supplemental credits. `bucket` is set for restricted vouchers only.
    vouchers (id) {
        id -> Uuid,
        account_id -> Uuid,
        kind -> Text,
        bucket -> Nullable<Text>,
        amount_cents -> Int8,
        multiplier_bp -> Int4,
        state -> Text,
        created_at -> Timestamptz,
        consumed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Committed orders. Lines are stored as a JSON snapshot.
    orders (id) {
        id -> Uuid,
        account_id -> Uuid,
        lines -> Jsonb,
        total_cents -> Int8,
        budget_portion_cents -> Int8,
        voucher_portion_cents -> Int8,
        consumed_vouchers -> Array<Uuid>,
        fingerprint -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Published rule configurations; the highest version is current.
    rule_config_versions (version) {
        version -> Int8,
        limits -> Jsonb,
        program_pause -> Nullable<Jsonb>,
        published_at -> Timestamptz,
    }
}

diesel::table! {
    /// Immutable failed-submission audit records.
    failed_order_attempts (id) {
        id -> Uuid,
        account_id -> Uuid,
        trace_id -> Nullable<Text>,
        kind -> Text,
        messages -> Jsonb,
        cart -> Jsonb,
        totals -> Jsonb,
        balance -> Nullable<Jsonb>,
        fingerprint -> Nullable<Text>,
        cart_hash -> Text,
        client -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(sub_ledgers -> ledgers (account_id));
diesel::joinable!(vouchers -> ledgers (account_id));
diesel::joinable!(orders -> ledgers (account_id));

diesel::allow_tables_to_appear_in_same_query!(
    ledgers,
    sub_ledgers,
    vouchers,
    orders,
    rule_config_versions,
    failed_order_attempts,
);
