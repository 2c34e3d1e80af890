//! SQL schema for the Gumbo SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS principals (
    principal_id    TEXT PRIMARY KEY,
    tenant          TEXT NOT NULL,
    email           TEXT NOT NULL,
    username        TEXT,
    password_hash   TEXT,            -- argon2 PHC string
    external_id     TEXT,
    display_name    TEXT,
    role            TEXT NOT NULL DEFAULT 'user',
    is_active       INTEGER NOT NULL DEFAULT 1,
    subscription_id TEXT,            -- informational; never read for entitlement
    created_at      TEXT NOT NULL,
    last_login_at   TEXT,
    UNIQUE (tenant, email)
);

CREATE TABLE IF NOT EXISTS subscriptions (
    subscription_id          TEXT PRIMARY KEY,
    principal_id             TEXT NOT NULL REFERENCES principals(principal_id),
    tenant                   TEXT NOT NULL,
    plan                     TEXT NOT NULL,   -- 'trial' | 'monthly' | 'yearly'
    status                   TEXT NOT NULL,   -- 'pending' | 'active' | 'cancelled' | 'expired'
    amount                   INTEGER NOT NULL,
    currency                 TEXT NOT NULL,
    start_date               TEXT NOT NULL,
    end_date                 TEXT NOT NULL,
    next_billing_date        TEXT,
    provider_subscription_id TEXT,
    last_payment_id          TEXT,
    last_payment_at          TEXT,
    last_failed_payment_id   TEXT,
    auto_renew               INTEGER NOT NULL,
    is_recurring             INTEGER NOT NULL,
    is_trial_subscription    INTEGER NOT NULL,
    trial_converted          INTEGER NOT NULL DEFAULT 0,
    failed_payment_count     INTEGER NOT NULL DEFAULT 0,
    cancellation_reason      TEXT,
    created_at               TEXT NOT NULL,
    updated_at               TEXT NOT NULL,
    revision                 INTEGER NOT NULL DEFAULT 0   -- bumped by every write
);

CREATE TABLE IF NOT EXISTS webhook_failures (
    failure_id               TEXT PRIMARY KEY,
    event                    TEXT NOT NULL,
    provider_subscription_id TEXT,
    payment_id               TEXT,
    reason                   TEXT NOT NULL,
    payload_digest           TEXT NOT NULL,   -- hex SHA-256 of the payload
    recorded_at              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS categories (
    category_id   TEXT PRIMARY KEY,
    tenant        TEXT NOT NULL,
    name          TEXT NOT NULL,
    description   TEXT,
    display_order INTEGER NOT NULL DEFAULT 0,
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topics (
    topic_id      TEXT PRIMARY KEY,
    tenant        TEXT NOT NULL,
    category_id   TEXT NOT NULL REFERENCES categories(category_id),
    title         TEXT NOT NULL,
    description   TEXT,
    is_premium    INTEGER NOT NULL DEFAULT 0,
    is_active     INTEGER NOT NULL DEFAULT 1,
    display_order INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS content_items (
    content_id  TEXT PRIMARY KEY,
    tenant      TEXT NOT NULL,
    topic_id    TEXT NOT NULL REFERENCES topics(topic_id),
    kind        TEXT NOT NULL,   -- discriminant of ContentBody variant
    title       TEXT NOT NULL,
    description TEXT,
    body_json   TEXT NOT NULL,   -- JSON payload (inner data only)
    is_locked   INTEGER NOT NULL DEFAULT 0,
    is_active   INTEGER NOT NULL DEFAULT 1,
    position    INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS learning_modules (
    module_id   TEXT PRIMARY KEY,
    tenant      TEXT NOT NULL,
    topic_id    TEXT NOT NULL REFERENCES topics(topic_id),
    title       TEXT NOT NULL,
    description TEXT,
    items_json  TEXT NOT NULL DEFAULT '[]',
    is_premium  INTEGER NOT NULL DEFAULT 0,
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS principals_external_idx
    ON principals(tenant, external_id);
CREATE INDEX IF NOT EXISTS subscriptions_principal_idx
    ON subscriptions(principal_id, status, end_date);
CREATE INDEX IF NOT EXISTS subscriptions_provider_idx
    ON subscriptions(provider_subscription_id);
CREATE INDEX IF NOT EXISTS categories_tenant_idx ON categories(tenant, display_order);
CREATE INDEX IF NOT EXISTS topics_tenant_idx     ON topics(tenant, category_id);
CREATE INDEX IF NOT EXISTS content_tenant_idx    ON content_items(tenant, topic_id, kind);
CREATE INDEX IF NOT EXISTS modules_tenant_idx    ON learning_modules(tenant, topic_id);

PRAGMA user_version = 1;
";
