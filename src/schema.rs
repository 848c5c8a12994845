diesel::table! {
    users (id) {
        id -> Integer,
        username -> Text,
        password_hash -> Text,
        display_name -> Nullable<Text>,
        email -> Nullable<Text>,
        role -> Text,
    }
}

diesel::table! {
    assets (id) {
        id -> Text,                     // uuid v4, immutable
        name -> Text,
        asset_type -> Text,
        mac -> Nullable<Text>,
        poll_address -> Nullable<Text>,
        owner_user_id -> Nullable<Integer>,
        source -> Text,                 // manual | <agent name> | poller
        online_status -> Text,          // online | offline
        last_seen -> Nullable<Timestamp>,
        poll_enabled -> Bool,
        poll_type -> Text,              // ping | ssh | ssh_cisco | ...
        poll_username -> Nullable<Text>,
        poll_password -> Nullable<Text>,
        poll_enable_password -> Nullable<Text>,
        poll_port -> Nullable<Integer>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    asset_ips (id) {
        id -> Integer,
        asset_id -> Text,
        family -> Text,                 // ipv4 | ipv6, derived from the address
        ip -> Text,
    }
}

diesel::table! {
    asset_attributes (asset_id) {
        asset_id -> Text,
        attributes -> Text,             // whole JSON document
        updated_by -> Text,
    }
}

diesel::table! {
    changes (id) {
        id -> Integer,
        asset_id -> Text,
        actor -> Text,
        source -> Text,
        field -> Text,
        old_value -> Nullable<Text>,    // serialized JSON
        new_value -> Nullable<Text>,    // serialized JSON
        changed_at -> Timestamp,
    }
}

diesel::table! {
    custom_fields (id) {
        id -> Integer,
        name -> Text,
        label -> Text,
        field_type -> Text,             // text | number | date | textarea | checkbox | select | email | url
        is_required -> Bool,
        default_value -> Nullable<Text>,
        select_options -> Nullable<Text>,   // serialized JSON list
        applies_to_types -> Nullable<Text>, // serialized JSON list, null = all types
        display_order -> Integer,
        help_text -> Nullable<Text>,
    }
}

diesel::table! {
    custom_field_values (id) {
        id -> Integer,
        asset_id -> Text,
        field_id -> Integer,
        value -> Nullable<Text>,
    }
}

diesel::table! {
    agents (id) {
        id -> Integer,
        name -> Text,
        token -> Text,
        platform -> Text,
        bound_asset -> Nullable<Text>,
        status -> Text,                 // active | revoked
        last_seen -> Nullable<Timestamp>,
        created_at -> Timestamp,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    users,
    assets,
    asset_ips,
    asset_attributes,
    changes,
    custom_fields,
    custom_field_values,
    agents,
);
