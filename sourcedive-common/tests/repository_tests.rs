//! Repository tests for row visibility, field redaction and write access

use chrono::{TimeZone, Utc};
use sourcedive_common::config::AuthConfig;
use sourcedive_common::db::taxonomy::{self, Taxonomy};
use sourcedive_common::db::{
    dives, init_database, interactions, people, users, InteractionInput, InteractionQuery,
    InteractionType, PersonInput, PersonQuery,
};
use sourcedive_common::{Error, PrivacyLevel, Viewer};
use sqlx::SqlitePool;
use tempfile::TempDir;

async fn setup() -> (TempDir, SqlitePool, Viewer, Viewer) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("sourcedive.db")).await.unwrap();
    let auth = AuthConfig::default();
    let (alice, _) = users::register_user(&pool, &auth, "alice", "alice@example.com")
        .await
        .unwrap();
    let (bob, _) = users::register_user(&pool, &auth, "bob", "bob@example.com")
        .await
        .unwrap();
    (
        dir,
        pool,
        Viewer::new(alice.id, alice.username),
        Viewer::new(bob.id, bob.username),
    )
}

fn person(name: &str, email: &str, level: PrivacyLevel) -> PersonInput {
    PersonInput {
        privacy_level: Some(level),
        name: Some(name.to_string()),
        email_address: Some(email.to_string()),
        phone_number_primary: Some("555-0100".to_string()),
        city: Some("Arlington".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_private_person_hidden_from_other_users() {
    let (_dir, pool, alice, bob) = setup().await;
    let id = people::create_person(
        &pool,
        &alice,
        person("Secret Source", "secret@example.com", PrivacyLevel::PrivateIndividual),
    )
    .await
    .unwrap();

    let query = PersonQuery::default();
    assert_eq!(people::count_people(&pool, &alice, &query).await.unwrap(), 1);
    assert_eq!(people::count_people(&pool, &bob, &query).await.unwrap(), 0);
    assert!(people::list_people(&pool, &bob, &query, 100, 0)
        .await
        .unwrap()
        .is_empty());

    let err = people::get_person(&pool, &bob, id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let detail = people::get_person(&pool, &alice, id).await.unwrap();
    assert_eq!(detail.person.email_address.as_deref(), Some("secret@example.com"));
}

#[tokio::test]
async fn test_searchable_person_redacts_contact_fields() {
    let (_dir, pool, alice, bob) = setup().await;
    let id = people::create_person(
        &pool,
        &alice,
        person("Semi Source", "semi@example.com", PrivacyLevel::Searchable),
    )
    .await
    .unwrap();

    let detail = people::get_person(&pool, &bob, id).await.unwrap();
    assert!(!detail.contact_fields_visible);
    assert_eq!(detail.person.email_address, None);
    assert_eq!(detail.person.phone_number_primary, None);
    assert_eq!(detail.person.city.as_deref(), Some("Arlington"));
    assert_eq!(
        detail.semiprivate_display["email_address_semiprivate_display"],
        "Please contact alice for this information"
    );

    let owner_view = people::get_person(&pool, &alice, id).await.unwrap();
    assert!(owner_view.contact_fields_visible);
    assert!(owner_view.semiprivate_display.is_empty());

    let layout = people::person_layout(&pool, &bob, id).await.unwrap();
    assert!(layout
        .readonly_fields
        .contains(&"email_address_semiprivate_display".to_string()));
}

#[tokio::test]
async fn test_search_does_not_match_hidden_email() {
    let (_dir, pool, alice, bob) = setup().await;
    people::create_person(
        &pool,
        &alice,
        person("Semi Source", "hidden-handle@example.com", PrivacyLevel::Searchable),
    )
    .await
    .unwrap();

    let query = PersonQuery {
        q: Some("hidden-handle".to_string()),
        ..Default::default()
    };
    assert_eq!(people::count_people(&pool, &alice, &query).await.unwrap(), 1);
    assert_eq!(people::count_people(&pool, &bob, &query).await.unwrap(), 0);

    let by_name = PersonQuery {
        q: Some("semi".to_string()),
        ..Default::default()
    };
    assert_eq!(people::count_people(&pool, &bob, &by_name).await.unwrap(), 1);
}

#[tokio::test]
async fn test_filters_and_filter_options_respect_visibility() {
    let (_dir, pool, alice, bob) = setup().await;
    let energy = taxonomy::create(&pool, Taxonomy::Industry, "Energy").await.unwrap();
    let retail = taxonomy::create(&pool, Taxonomy::Industry, "Retail").await.unwrap();

    let mut public = person("Public Source", "public@example.com", PrivacyLevel::Public);
    public.industries = vec![energy.id];
    people::create_person(&pool, &alice, public).await.unwrap();

    let mut private = person("Private Source", "private@example.com", PrivacyLevel::PrivateIndividual);
    private.industries = vec![retail.id];
    people::create_person(&pool, &alice, private).await.unwrap();

    let options = people::filter_options(&pool, &bob).await.unwrap();
    assert_eq!(options.industries, vec!["Energy".to_string()]);
    let options = people::filter_options(&pool, &alice).await.unwrap();
    assert_eq!(options.industries, vec!["Energy".to_string(), "Retail".to_string()]);

    let retail_query = PersonQuery {
        industry: Some("Retail".to_string()),
        ..Default::default()
    };
    assert_eq!(people::count_people(&pool, &bob, &retail_query).await.unwrap(), 0);
    assert_eq!(people::count_people(&pool, &alice, &retail_query).await.unwrap(), 1);

    let level_query = PersonQuery {
        privacy_level: Some(PrivacyLevel::Public),
        ..Default::default()
    };
    let rows = people::list_people(&pool, &alice, &level_query, 100, 0).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "Public Source");
    assert_eq!(rows[0].created_by.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_create_person_sets_server_fields() {
    let (_dir, pool, alice, _bob) = setup().await;
    let mut input = person("Ada", "ada@example.com", PrivacyLevel::Public);
    input.twitter = Some("@ada".to_string());
    let id = people::create_person(&pool, &alice, input).await.unwrap();

    let record = people::get_person_record(&pool, &alice, id).await.unwrap();
    assert_eq!(record.twitter.as_deref(), Some("ada"));
    assert_eq!(record.entry_method.as_deref(), Some("admin-form"));
    assert_eq!(record.entry_type.as_deref(), Some("manual"));
    assert_eq!(record.created_by, Some(alice.user_id));
}

#[tokio::test]
async fn test_create_person_rejects_invalid_input() {
    let (_dir, pool, alice, _bob) = setup().await;

    let mut bad_prefix = person("Ada", "ada@example.com", PrivacyLevel::Public);
    bad_prefix.prefix = Some("Lady".to_string());
    let err = people::create_person(&pool, &alice, bad_prefix).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let mut unknown_tag = person("Ada", "ada@example.com", PrivacyLevel::Public);
    unknown_tag.expertise = vec![999];
    let err = people::create_person(&pool, &alice, unknown_tag).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_update_respects_readonly_contact_fields() {
    let (_dir, pool, alice, bob) = setup().await;
    let id = people::create_person(
        &pool,
        &alice,
        person("Semi Source", "semi@example.com", PrivacyLevel::Searchable),
    )
    .await
    .unwrap();

    // Sending contact fields for a redacted record is refused
    let attempt = person("Semi Source", "changed@example.com", PrivacyLevel::Searchable);
    let err = people::update_person(&pool, &bob, id, attempt).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    // Leaving them out keeps the stored values
    let update = PersonInput {
        privacy_level: Some(PrivacyLevel::Searchable),
        name: Some("Semi Source Renamed".to_string()),
        ..Default::default()
    };
    people::update_person(&pool, &bob, id, update).await.unwrap();

    let record = people::get_person_record(&pool, &alice, id).await.unwrap();
    assert_eq!(record.name, "Semi Source Renamed");
    assert_eq!(record.email_address.as_deref(), Some("semi@example.com"));
    assert_eq!(record.phone_number_primary.as_deref(), Some("555-0100"));
}

#[tokio::test]
async fn test_redacted_viewer_cannot_change_privacy_level() {
    let (_dir, pool, alice, bob) = setup().await;
    let id = people::create_person(
        &pool,
        &alice,
        person("Deep Throat", "dt@example.com", PrivacyLevel::Searchable),
    )
    .await
    .unwrap();

    let before = people::get_person(&pool, &bob, id).await.unwrap();
    assert!(!before.contact_fields_visible);

    // Publishing the source would reveal its contact fields
    let publish = PersonInput {
        privacy_level: Some(PrivacyLevel::Public),
        name: Some("Deep Throat".to_string()),
        ..Default::default()
    };
    let err = people::update_person(&pool, &bob, id, publish).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    let after = people::get_person(&pool, &bob, id).await.unwrap();
    assert!(!after.contact_fields_visible);
    assert_eq!(after.person.privacy_level, PrivacyLevel::Searchable);
    assert_eq!(after.person.email_address, None);

    // Omitting the level keeps it
    let rename = PersonInput {
        name: Some("Mark Felt".to_string()),
        ..Default::default()
    };
    people::update_person(&pool, &bob, id, rename).await.unwrap();
    let record = people::get_person_record(&pool, &alice, id).await.unwrap();
    assert_eq!(record.name, "Mark Felt");
    assert_eq!(record.privacy_level, PrivacyLevel::Searchable);

    let layout = people::person_layout(&pool, &bob, id).await.unwrap();
    assert!(layout.readonly_fields.contains(&"privacy_level".to_string()));
    let owner_layout = people::person_layout(&pool, &alice, id).await.unwrap();
    assert!(!owner_layout.readonly_fields.contains(&"privacy_level".to_string()));
}

#[tokio::test]
async fn test_private_person_cannot_be_updated_by_others() {
    let (_dir, pool, alice, bob) = setup().await;
    let id = people::create_person(
        &pool,
        &alice,
        person("Secret", "secret@example.com", PrivacyLevel::PrivateIndividual),
    )
    .await
    .unwrap();

    let err = people::update_person(
        &pool,
        &bob,
        id,
        person("Hijacked", "secret@example.com", PrivacyLevel::Public),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_only_creator_may_delete_person() {
    let (_dir, pool, alice, bob) = setup().await;
    let id = people::create_person(
        &pool,
        &alice,
        person("Public", "public@example.com", PrivacyLevel::Public),
    )
    .await
    .unwrap();

    let err = people::delete_person(&pool, &bob, id).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    people::delete_person(&pool, &alice, id).await.unwrap();
    let err = people::get_person(&pool, &alice, id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_interaction_notes_follow_privacy_level() {
    let (_dir, pool, alice, bob) = setup().await;
    let source = people::create_person(
        &pool,
        &alice,
        person("Public Source", "public@example.com", PrivacyLevel::Public),
    )
    .await
    .unwrap();

    let input = InteractionInput {
        privacy_level: Some(PrivacyLevel::Searchable),
        date_time: Some(Utc.with_ymd_and_hms(2019, 5, 21, 16, 40, 0).unwrap()),
        interaction_type: Some(InteractionType::Telephone),
        interviewee_id: Some(source),
        interviewers: vec![alice.user_id],
        notes: Some("off the record".to_string()),
    };
    let id = interactions::create_interaction(&pool, &alice, input).await.unwrap();

    let detail = interactions::get_interaction(&pool, &bob, id).await.unwrap();
    assert!(!detail.notes_visible);
    assert_eq!(detail.interaction.notes, None);
    assert_eq!(
        detail.notes_semiprivate_display.as_deref(),
        Some("Please contact alice for this information")
    );
    assert!(detail.readonly_fields.contains(&"privacy_level".to_string()));
    assert_eq!(detail.display, "Public Source via telephone (2019-05-21 at 16:40:00)");

    let owner = interactions::get_interaction(&pool, &alice, id).await.unwrap();
    assert_eq!(owner.interaction.notes.as_deref(), Some("off the record"));

    let inline = people::get_person(&pool, &bob, source).await.unwrap().interactions;
    assert_eq!(inline.len(), 1);
    assert!(inline[0].notes_view.starts_with("Contact alice for these notes"));
    assert_eq!(inline[0].interviewers[0].name, "alice");

    // Inline, searchable notes are replaced for the creator too
    let own_inline = people::get_person(&pool, &alice, source).await.unwrap().interactions;
    assert!(own_inline[0].notes_view.starts_with("Contact alice for these notes"));
}

#[tokio::test]
async fn test_private_interactions_hidden_and_list_ordering() {
    let (_dir, pool, alice, bob) = setup().await;
    for (day, level) in [(1, PrivacyLevel::Public), (2, PrivacyLevel::PrivateIndividual), (3, PrivacyLevel::Public)] {
        let input = InteractionInput {
            privacy_level: Some(level),
            date_time: Some(Utc.with_ymd_and_hms(2020, 1, day, 9, 0, 0).unwrap()),
            interaction_type: Some(InteractionType::Email),
            ..Default::default()
        };
        interactions::create_interaction(&pool, &alice, input).await.unwrap();
    }

    let query = InteractionQuery::default();
    assert_eq!(interactions::count_interactions(&pool, &alice, &query).await.unwrap(), 3);
    assert_eq!(interactions::count_interactions(&pool, &bob, &query).await.unwrap(), 2);

    let rows = interactions::list_interactions(&pool, &bob, &query, 100, 0).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].date_time > rows[1].date_time);

    let telephone = InteractionQuery {
        interaction_type: Some(InteractionType::Telephone),
    };
    assert_eq!(interactions::count_interactions(&pool, &alice, &telephone).await.unwrap(), 0);
}

#[tokio::test]
async fn test_redacted_interaction_update_rules() {
    let (_dir, pool, alice, bob) = setup().await;
    let when = Utc.with_ymd_and_hms(2020, 2, 1, 12, 0, 0).unwrap();
    let id = interactions::create_interaction(
        &pool,
        &alice,
        InteractionInput {
            privacy_level: Some(PrivacyLevel::Searchable),
            date_time: Some(when),
            notes: Some("secret notes".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let change_level = InteractionInput {
        privacy_level: Some(PrivacyLevel::Public),
        date_time: Some(when),
        ..Default::default()
    };
    let err = interactions::update_interaction(&pool, &bob, id, change_level).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    let keep = InteractionInput {
        date_time: Some(when),
        interaction_type: Some(InteractionType::InPerson),
        ..Default::default()
    };
    interactions::update_interaction(&pool, &bob, id, keep).await.unwrap();

    let record = interactions::get_interaction_record(&pool, &alice, id).await.unwrap();
    assert_eq!(record.notes.as_deref(), Some("secret notes"));
    assert_eq!(record.interaction_type, Some(InteractionType::InPerson));

    let err = interactions::delete_interaction(&pool, &bob, id).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
}

#[tokio::test]
async fn test_interviewee_hidden_from_other_users() {
    let (_dir, pool, alice, bob) = setup().await;
    let secret = people::create_person(
        &pool,
        &alice,
        person("Secret", "secret@example.com", PrivacyLevel::PrivateIndividual),
    )
    .await
    .unwrap();
    let id = interactions::create_interaction(
        &pool,
        &alice,
        InteractionInput {
            privacy_level: Some(PrivacyLevel::Public),
            date_time: Some(Utc.with_ymd_and_hms(2020, 3, 1, 8, 30, 0).unwrap()),
            interviewee_id: Some(secret),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let detail = interactions::get_interaction(&pool, &bob, id).await.unwrap();
    assert_eq!(detail.interaction.interviewee_name, None);
    assert_eq!(detail.interaction.interviewee_id, None);
    assert!(detail.interaction.interviewee_hidden);
    assert!(detail.display.starts_with("(private source)"));

    let owner = interactions::get_interaction(&pool, &alice, id).await.unwrap();
    assert_eq!(owner.interaction.interviewee_id, Some(secret));
    assert!(!owner.interaction.interviewee_hidden);

    // Saving without an interviewee keeps the one Bob cannot see
    let edit = InteractionInput {
        privacy_level: Some(PrivacyLevel::Public),
        date_time: Some(Utc.with_ymd_and_hms(2020, 3, 1, 9, 0, 0).unwrap()),
        notes: Some("follow up".to_string()),
        ..Default::default()
    };
    interactions::update_interaction(&pool, &bob, id, edit).await.unwrap();
    let record = interactions::get_interaction_record(&pool, &alice, id).await.unwrap();
    assert_eq!(record.interviewee_id, Some(secret));
    assert_eq!(record.notes.as_deref(), Some("follow up"));

    // Bob cannot attach an interaction to a source he cannot see
    let err = interactions::create_interaction(
        &pool,
        &bob,
        InteractionInput {
            privacy_level: Some(PrivacyLevel::Public),
            date_time: Some(Utc::now()),
            interviewee_id: Some(secret),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_taxonomy_unique_names_and_search() {
    let (_dir, pool, _alice, _bob) = setup().await;
    taxonomy::create(&pool, Taxonomy::Expertise, "Solar power").await.unwrap();
    taxonomy::create(&pool, Taxonomy::Expertise, "Wind power").await.unwrap();

    let err = taxonomy::create(&pool, Taxonomy::Expertise, "Solar power").await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let hits = taxonomy::list(&pool, Taxonomy::Expertise, Some("solar")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(taxonomy::list(&pool, Taxonomy::Expertise, None).await.unwrap().len(), 2);

    let mut conn = pool.acquire().await.unwrap();
    let id = taxonomy::get_or_create(&mut conn, Taxonomy::Expertise, " Wind power ").await.unwrap();
    assert_eq!(id, hits[0].id + 1);
    drop(conn);

    taxonomy::delete(&pool, Taxonomy::Expertise, id).await.unwrap();
    let err = taxonomy::delete(&pool, Taxonomy::Expertise, id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_dive_membership() {
    let (_dir, pool, alice, bob) = setup().await;
    let dive = dives::create_dive(&pool, "Utility Dive").await.unwrap();
    dives::add_member(&pool, dive.id, alice.user_id).await.unwrap();
    dives::add_member(&pool, dive.id, bob.user_id).await.unwrap();
    dives::add_member(&pool, dive.id, bob.user_id).await.unwrap();

    let loaded = dives::get_dive(&pool, dive.id).await.unwrap();
    let names: Vec<&str> = loaded.members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["alice", "bob"]);

    dives::remove_member(&pool, dive.id, bob.user_id).await.unwrap();
    let err = dives::remove_member(&pool, dive.id, bob.user_id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = dives::create_dive(&pool, "Utility Dive").await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn test_registration_and_first_login() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("sourcedive.db")).await.unwrap();
    let auth = AuthConfig {
        allowed_email_domains: vec!["industrydive.com".to_string()],
    };

    let err = users::register_user(&pool, &auth, "outsider", "someone@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    let (user, token) = users::register_user(&pool, &auth, "reporter", "reporter@industrydive.com")
        .await
        .unwrap();
    assert!(!user.is_staff);
    assert!(user.last_login.is_none());

    let authed = users::authenticate_token(&pool, &token).await.unwrap().unwrap();
    assert!(authed.is_staff);
    assert!(authed.last_login.is_some());

    let stored = users::get_user(&pool, user.id).await.unwrap();
    assert!(stored.is_staff);

    assert!(users::authenticate_token(&pool, "wrong").await.unwrap().is_none());

    let new_token = users::issue_token(&pool, &auth, user.id).await.unwrap();
    assert!(users::authenticate_token(&pool, &token).await.unwrap().is_none());
    assert!(users::authenticate_token(&pool, &new_token).await.unwrap().is_some());
}

#[tokio::test]
async fn test_deleting_creator_clears_created_by() {
    let (_dir, pool, alice, bob) = setup().await;
    let id = people::create_person(
        &pool,
        &alice,
        person("Public", "public@example.com", PrivacyLevel::Public),
    )
    .await
    .unwrap();

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(alice.user_id)
        .execute(&pool)
        .await
        .unwrap();

    let record = people::get_person_record(&pool, &bob, id).await.unwrap();
    assert_eq!(record.created_by, None);
}
