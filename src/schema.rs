diesel::table! {
    access_grants (id) {
        id -> Uuid,
        case_id -> Uuid,
        #[max_length = 20]
        grant_type -> Varchar,
        #[max_length = 255]
        value -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    case_documents (case_id, document_id) {
        case_id -> Uuid,
        document_id -> Uuid,
    }
}

diesel::table! {
    case_parties (id) {
        id -> Uuid,
        seq -> Int8,
        case_id -> Uuid,
        #[max_length = 100]
        role -> Nullable<Varchar>,
        party_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    cases (id) {
        id -> Uuid,
        #[max_length = 50]
        number -> Varchar,
        #[max_length = 255]
        subject -> Varchar,
        #[max_length = 50]
        access_level -> Varchar,
        legal_basis -> Nullable<Text>,
        notes -> Text,
        #[max_length = 50]
        status -> Varchar,
        #[max_length = 50]
        priority -> Varchar,
        #[max_length = 100]
        department -> Varchar,
        #[max_length = 100]
        assigned_user -> Nullable<Varchar>,
        due_date -> Nullable<Date>,
        pending -> Bool,
        #[max_length = 100]
        pending_origin_department -> Nullable<Varchar>,
        #[max_length = 100]
        pending_dest_department -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    departments (code) {
        #[max_length = 100]
        code -> Varchar,
        #[max_length = 255]
        name -> Varchar,
    }
}

diesel::table! {
    documents (id) {
        id -> Uuid,
        #[max_length = 255]
        title -> Varchar,
        #[max_length = 100]
        doc_type -> Nullable<Varchar>,
        #[max_length = 50]
        mode -> Varchar,
        #[max_length = 50]
        status -> Varchar,
        #[max_length = 255]
        file_name -> Nullable<Varchar>,
        content_base64 -> Nullable<Text>,
        body -> Nullable<Text>,
        #[max_length = 100]
        author -> Nullable<Varchar>,
        #[max_length = 100]
        signed_by -> Nullable<Varchar>,
        signed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    parties (id) {
        id -> Uuid,
        #[max_length = 20]
        kind -> Varchar,
        #[max_length = 255]
        name -> Varchar,
        #[max_length = 50]
        document_number -> Nullable<Varchar>,
        #[max_length = 255]
        email -> Nullable<Varchar>,
        #[max_length = 50]
        phone -> Nullable<Varchar>,
        #[max_length = 255]
        address -> Nullable<Varchar>,
        #[max_length = 255]
        city -> Nullable<Varchar>,
        #[max_length = 2]
        state -> Nullable<Varchar>,
        #[max_length = 20]
        postal_code -> Nullable<Varchar>,
        #[max_length = 100]
        access_key -> Nullable<Varchar>,
        access_key_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    routing_events (id) {
        id -> Uuid,
        case_id -> Uuid,
        #[max_length = 100]
        origin_department -> Varchar,
        #[max_length = 100]
        dest_department -> Varchar,
        reason -> Nullable<Text>,
        #[max_length = 50]
        priority -> Nullable<Varchar>,
        due_date -> Nullable<Date>,
        #[max_length = 100]
        acting_user -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    users (login) {
        #[max_length = 100]
        login -> Varchar,
        #[max_length = 100]
        department -> Varchar,
        #[max_length = 255]
        name -> Nullable<Varchar>,
        #[max_length = 255]
        title -> Nullable<Varchar>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    access_grants,
    case_documents,
    case_parties,
    cases,
    departments,
    documents,
    parties,
    routing_events,
    users,
);
