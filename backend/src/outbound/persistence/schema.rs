//! Diesel table definitions matching `backend/migrations`.

diesel::table! {
    catalog_records (id) {
        id -> Int8,
        inventory_code -> Nullable<Text>,
        name -> Text,
        description -> Text,
        category -> Text,
        manufacturer -> Text,
        manufactured_on -> Text,
        condition -> Text,
        origin -> Text,
        attributes -> Jsonb,
        primary_asset -> Nullable<Text>,
        version -> Int4,
        created_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    record_assets (id) {
        id -> Int8,
        record_id -> Int8,
        path -> Text,
        caption -> Text,
        position -> Int4,
    }
}

diesel::table! {
    record_links (id) {
        id -> Int8,
        record_id -> Int8,
        url -> Text,
        position -> Int4,
    }
}

diesel::table! {
    login_attempts (id) {
        id -> Int8,
        identity -> Text,
        origin -> Text,
        attempts -> Int4,
        locked_until -> Nullable<Timestamptz>,
        last_attempt -> Timestamptz,
    }
}

diesel::joinable!(record_assets -> catalog_records (record_id));
diesel::joinable!(record_links -> catalog_records (record_id));

diesel::allow_tables_to_appear_in_same_query!(catalog_records, record_assets, record_links);
