//! # Bot Conversation Tests
//!
//! Drives [`DialogueManager`] through whole conversations against the
//! in-memory store, a scripted VK API and a gateway that records replies.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use vkinder::bot::message_handler::{message_handler, UserBatch};
use vkinder::bot::{DialogueManager, UserLocks};
use vkinder::config::SearchConfig;
use vkinder::dialogue::{AgeRange, Gender, Position};
use vkinder::errors::VkError;
use vkinder::localization::{t_args_lang, t_lang};
use vkinder::store::{CandidateRecord, CriteriaUpdate, MemoryStore, PreferenceStore, UserName};
use vkinder::vk::{City, FoundUser, Likes, MessageGateway, OutboundMessage, Photo, SearchQuery, VkApi};

const USER: i64 = 1001;
const LANG: &str = "ru";

/// VK API with search results keyed by offset
#[derive(Default)]
struct ScriptedVk {
    results: Mutex<HashMap<i32, FoundUser>>,
    photos: Mutex<HashMap<i64, Vec<Photo>>>,
    queries: Mutex<Vec<SearchQuery>>,
    fail_requests: AtomicBool,
    fail_photos: AtomicBool,
}

impl ScriptedVk {
    fn add_result(&self, offset: i32, id: i64, is_closed: bool) {
        self.results.lock().unwrap().insert(
            offset,
            FoundUser {
                id,
                first_name: format!("Name{id}"),
                last_name: format!("Surname{id}"),
                is_closed,
            },
        );
    }

    fn add_photos(&self, owner_id: i64, likes: &[u32]) {
        let photos = likes
            .iter()
            .enumerate()
            .map(|(i, &count)| Photo {
                id: i as i64 + 1,
                owner_id,
                likes: Likes { count },
            })
            .collect();
        self.photos.lock().unwrap().insert(owner_id, photos);
    }

    /// Public candidate with photos at `offset`
    fn add_candidate(&self, offset: i32, id: i64) {
        self.add_result(offset, id, false);
        self.add_photos(id, &[3, 10]);
    }

    fn fail(&self) -> Result<(), VkError> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(VkError::Api {
                code: 10,
                message: "Internal server error".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VkApi for ScriptedVk {
    async fn search_users(&self, query: &SearchQuery) -> Result<Vec<FoundUser>, VkError> {
        self.fail()?;
        self.queries.lock().unwrap().push(*query);
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(&query.offset)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn profile_photos(&self, owner_id: i64) -> Result<Vec<Photo>, VkError> {
        self.fail()?;
        if self.fail_photos.load(Ordering::SeqCst) {
            return Err(VkError::Api {
                code: 30,
                message: "This profile is private".to_string(),
            });
        }
        Ok(self.photos.lock().unwrap().get(&owner_id).cloned().unwrap_or_default())
    }

    async fn find_city(&self, name: &str) -> Result<Option<City>, VkError> {
        self.fail()?;
        Ok((name == "москва").then(|| City {
            id: 1,
            title: "Москва".to_string(),
        }))
    }

    async fn user_name(&self, _user_id: i64) -> Result<UserName, VkError> {
        self.fail()?;
        Ok(UserName {
            first_name: "Ivan".to_string(),
            last_name: "Petrov".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<OutboundMessage>>,
    fail_delivery: AtomicBool,
}

impl RecordingGateway {
    fn last(&self) -> Option<OutboundMessage> {
        self.sent.lock().unwrap().last().cloned()
    }

    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.text.clone()).collect()
    }
}

#[async_trait]
impl MessageGateway for RecordingGateway {
    async fn send(&self, message: &OutboundMessage) -> Result<(), VkError> {
        if self.fail_delivery.load(Ordering::SeqCst) {
            return Err(VkError::Api {
                code: 901,
                message: "Can't send messages for users without permission".to_string(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    vk: Arc<ScriptedVk>,
    gateway: Arc<RecordingGateway>,
    dialogue: Arc<DialogueManager>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SearchConfig::default())
    }

    fn with_config(config: SearchConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let vk = Arc::new(ScriptedVk::default());
        let gateway = Arc::new(RecordingGateway::default());
        let dialogue = Arc::new(DialogueManager::new(
            Arc::clone(&store) as Arc<dyn PreferenceStore>,
            Arc::clone(&vk) as Arc<dyn VkApi>,
            Arc::clone(&gateway) as Arc<dyn MessageGateway>,
            config,
            LANG,
        ));
        Self {
            store,
            vk,
            gateway,
            dialogue,
        }
    }

    async fn say(&self, text: &str) {
        self.dialogue.handle_message(USER, text).await;
    }

    async fn position(&self) -> Result<Position> {
        Ok(self
            .store
            .get_position(USER)
            .await?
            .map(|row| row.position)
            .unwrap_or_default())
    }

    async fn offset(&self) -> Result<i32> {
        Ok(self.store.get_position(USER).await?.map(|row| row.offset).unwrap_or(0))
    }

    /// A user with complete criteria, placed at `position` with `offset`
    async fn seed_user(&self, position: Position, offset: i32) -> Result<()> {
        self.store.create_profile(USER).await?;
        self.store.register_position(USER).await?;
        self.store.update_criteria(USER, CriteriaUpdate::City(1)).await?;
        self.store
            .update_criteria(USER, CriteriaUpdate::AgeRange(AgeRange { min: 25, max: 30 }))
            .await?;
        self.store
            .update_criteria(USER, CriteriaUpdate::Gender(Gender::Female))
            .await?;
        self.store.set_offset(USER, offset).await?;
        self.store.set_position(USER, position).await?;
        Ok(())
    }
}

fn candidate(id: i64) -> CandidateRecord {
    CandidateRecord {
        candidate_id: id,
        first_name: format!("Name{id}"),
        last_name: format!("Surname{id}"),
    }
}

#[tokio::test]
async fn test_first_message_sends_welcome() -> Result<()> {
    let h = Harness::new();
    h.say("старт").await;

    let reply = h.gateway.last().expect("welcome sent");
    assert_eq!(reply.user_id, USER);
    assert_eq!(reply.text, t_lang("welcome", LANG));
    assert_eq!(reply.keyboard.expect("start button").labels(), vec!["Старт"]);
    assert_eq!(h.position().await?, Position::AwaitingStart);
    assert!(h.store.get_profile(USER).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_onboarding_collects_criteria_and_offers_candidate() -> Result<()> {
    let h = Harness::new();
    h.vk.add_candidate(0, 777);

    h.say("Привет").await;
    h.say("Старт").await;
    assert_eq!(h.position().await?, Position::AwaitingCity);
    assert_eq!(h.gateway.last().unwrap().text, t_lang("prompt-city", LANG));

    h.say("Москва").await;
    assert_eq!(h.position().await?, Position::AwaitingAgeRange);

    h.say("25").await;
    let profile = h.store.get_profile(USER).await?.expect("profile");
    assert_eq!(profile.age_range, Some(AgeRange { min: 25, max: 25 }));
    assert_eq!(profile.city_id, Some(1));
    assert_eq!(h.position().await?, Position::AwaitingGender);
    let gender_prompt = h.gateway.last().unwrap();
    assert_eq!(
        gender_prompt.keyboard.expect("gender buttons").labels(),
        vec!["Мужской", "Женский"]
    );

    h.say("Женский").await;
    assert_eq!(h.position().await?, Position::Browsing);
    let profile = h.store.get_profile(USER).await?.expect("profile");
    assert_eq!(profile.gender, Some(Gender::Female));
    assert_eq!(profile.first_name.as_deref(), Some("Ivan"));

    let offer = h.gateway.last().unwrap();
    assert!(offer.text.contains("@id777"));
    assert_eq!(offer.attachments, vec!["photo777_2", "photo777_1"]);
    assert_eq!(h.offset().await?, 1);
    assert_eq!(h.store.latest_candidate(USER).await?, Some(candidate(777)));

    let query = h.vk.queries.lock().unwrap()[0];
    assert_eq!(query.gender, Gender::Female);
    assert_eq!(query.age_range, AgeRange { min: 25, max: 25 });
    Ok(())
}

#[tokio::test]
async fn test_unrecognized_city_and_age_keep_position() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::AwaitingCity, 0).await?;

    h.say("атлантида").await;
    assert_eq!(h.position().await?, Position::AwaitingCity);
    assert_eq!(h.gateway.last().unwrap().text, t_lang("city-unknown", LANG));

    h.store.set_position(USER, Position::AwaitingAgeRange).await?;
    for input in ["сорок", "30-20", "17-25", "20 25 30"] {
        h.say(input).await;
        assert_eq!(h.position().await?, Position::AwaitingAgeRange, "input {input}");
        assert_eq!(h.gateway.last().unwrap().text, t_lang("age-range-unknown", LANG));
    }

    h.say("от 20 до 30").await;
    assert_eq!(h.position().await?, Position::AwaitingGender);
    let profile = h.store.get_profile(USER).await?.expect("profile");
    assert_eq!(profile.age_range, Some(AgeRange { min: 20, max: 30 }));
    Ok(())
}

#[tokio::test]
async fn test_favorite_then_list_shows_candidate() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 0).await?;
    h.vk.add_candidate(0, 501);
    h.vk.add_candidate(1, 502);

    h.say("далее").await;
    assert!(h.gateway.last().unwrap().text.contains("@id501"));

    h.say("в избранное").await;
    assert_eq!(h.store.favorites(USER).await?, vec![candidate(501)]);
    assert!(h.gateway.texts().contains(&t_lang("favorite-added", LANG)));
    // Favoriting moves on to the next candidate
    assert!(h.gateway.last().unwrap().text.contains("@id502"));

    h.say("список избранных").await;
    let list = h.gateway.last().unwrap();
    assert!(list.text.contains("@id501"));
    assert!(!list.text.contains("@id502"));
    assert_eq!(list.keyboard.expect("favorites keyboard").buttons.len(), 2);
    assert_eq!(h.position().await?, Position::ViewingFavorites);
    Ok(())
}

#[tokio::test]
async fn test_favorite_twice_is_reported() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 0).await?;
    h.store.append_candidate(USER, &candidate(42)).await?;
    h.store.add_favorite(USER, &candidate(42)).await?;

    h.say("в избранное").await;
    assert!(h.gateway.texts().contains(&t_lang("favorite-already", LANG)));
    assert_eq!(h.store.favorites(USER).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_favorite_without_offer() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 0).await?;

    h.say("в избранное").await;
    assert_eq!(h.gateway.texts(), vec![t_lang("favorite-none", LANG)]);
    assert!(h.store.favorites(USER).await?.is_empty());
    assert_eq!(h.position().await?, Position::Browsing);
    Ok(())
}

#[tokio::test]
async fn test_remove_partner_flow() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::ViewingFavorites, 0).await?;
    h.store.add_favorite(USER, &candidate(555)).await?;
    h.vk.add_candidate(0, 600);

    h.say("удалить партнера из списка").await;
    assert_eq!(h.position().await?, Position::AwaitingRemovalId);

    // Not one of the favorites
    h.say("999").await;
    assert_eq!(h.position().await?, Position::AwaitingRemovalId);
    assert_eq!(h.gateway.last().unwrap().text, t_lang("removal-id-unknown", LANG));

    h.say("qwerty").await;
    assert_eq!(h.position().await?, Position::AwaitingRemovalId);

    h.say("id555").await;
    assert!(h.store.favorites(USER).await?.is_empty());
    assert!(h.gateway.texts().contains(&t_lang("favorite-removed", LANG)));
    assert_eq!(h.position().await?, Position::Browsing);
    assert!(h.gateway.last().unwrap().text.contains("@id600"));
    Ok(())
}

#[tokio::test]
async fn test_continue_search_from_favorites() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::ViewingFavorites, 0).await?;
    h.vk.add_candidate(0, 700);

    h.say("продолжить поиск").await;
    assert_eq!(h.position().await?, Position::Browsing);
    assert!(h.gateway.last().unwrap().text.contains("@id700"));
    Ok(())
}

#[tokio::test]
async fn test_private_profile_is_skipped() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 3).await?;
    h.vk.add_result(3, 900, true);
    h.vk.add_candidate(4, 901);

    h.say("далее").await;
    let offer = h.gateway.last().unwrap();
    assert!(offer.text.contains("@id901"));
    assert_eq!(h.offset().await?, 5);
    assert_eq!(h.store.avoid_list(USER).await?, vec![901]);
    Ok(())
}

#[tokio::test]
async fn test_already_shown_candidate_is_skipped() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 0).await?;
    h.store.append_candidate(USER, &candidate(10)).await?;
    h.vk.add_candidate(0, 10);
    h.vk.add_candidate(1, 11);

    h.say("далее").await;
    assert!(h.gateway.last().unwrap().text.contains("@id11"));
    assert_eq!(h.offset().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_skip_limit_stops_search() -> Result<()> {
    let h = Harness::with_config(SearchConfig {
        max_skipped_candidates: 2,
        ..SearchConfig::default()
    });
    h.seed_user(Position::Browsing, 0).await?;
    for offset in 0..5 {
        h.vk.add_result(offset, 100 + offset as i64, true);
    }

    h.say("далее").await;
    assert_eq!(
        h.gateway.last().unwrap().text,
        t_args_lang("search-skip-limit", &[("skipped", "2")], LANG)
    );
    assert_eq!(h.offset().await?, 2);
    assert_eq!(h.position().await?, Position::Browsing);
    Ok(())
}

#[tokio::test]
async fn test_exhausted_search_restarts() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 7).await?;

    h.say("далее").await;
    assert_eq!(h.gateway.last().unwrap().text, t_lang("search-exhausted", LANG));
    assert_eq!(h.position().await?, Position::AwaitingStart);
    assert_eq!(h.offset().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_candidate_without_photos_is_not_offered() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 0).await?;
    h.vk.add_result(0, 300, false);

    h.say("далее").await;
    assert_eq!(h.gateway.count(), 0);
    assert_eq!(h.offset().await?, 1);
    assert!(h.store.latest_candidate(USER).await?.is_none());
    assert_eq!(h.position().await?, Position::Browsing);
    Ok(())
}

#[tokio::test]
async fn test_exit_resets_to_fresh() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 4).await?;

    h.say("Пока").await;
    assert_eq!(h.gateway.last().unwrap().text, t_lang("goodbye", LANG));
    assert_eq!(h.position().await?, Position::Fresh);

    // Next message starts over
    h.say("что угодно").await;
    assert_eq!(h.gateway.last().unwrap().text, t_lang("welcome", LANG));
    assert_eq!(h.position().await?, Position::AwaitingStart);
    Ok(())
}

#[tokio::test]
async fn test_change_criteria_restarts_at_city() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::ViewingFavorites, 9).await?;

    h.say("изменить критерии поиска").await;
    assert_eq!(h.position().await?, Position::AwaitingCity);
    assert_eq!(h.offset().await?, 0);
    assert_eq!(h.gateway.last().unwrap().text, t_lang("prompt-city", LANG));
    Ok(())
}

#[tokio::test]
async fn test_greeting_resets_dialogue() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::AwaitingRemovalId, 3).await?;

    h.say("hello").await;
    assert_eq!(h.position().await?, Position::AwaitingStart);
    assert_eq!(h.offset().await?, 3);
    Ok(())
}

#[tokio::test]
async fn test_unknown_input_repeats_options() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 0).await?;

    h.say("что это").await;
    let reply = h.gateway.last().unwrap();
    assert_eq!(reply.text, t_lang("unknown-command", LANG));
    assert_eq!(
        reply.keyboard.expect("browse keyboard").labels(),
        vec!["Далее", "В избранное", "Список избранных"]
    );
    assert_eq!(h.position().await?, Position::Browsing);
    Ok(())
}

#[tokio::test]
async fn test_invalid_position_reports_error() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 0).await?;
    h.store.set_position_code(USER, 42).await;

    h.say("далее").await;
    assert_eq!(h.gateway.last().unwrap().text, t_lang("server-error", LANG));
    assert!(h.store.get_position(USER).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_api_failure_restarts_dialogue() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::AwaitingCity, 0).await?;
    h.vk.fail_requests.store(true, Ordering::SeqCst);

    h.say("москва").await;
    assert_eq!(h.gateway.last().unwrap().text, t_lang("server-error", LANG));
    assert_eq!(h.position().await?, Position::AwaitingStart);
    Ok(())
}

#[tokio::test]
async fn test_api_failure_during_search_resets_offset() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 12).await?;
    h.vk.fail_requests.store(true, Ordering::SeqCst);

    h.say("далее").await;
    assert_eq!(h.gateway.last().unwrap().text, t_lang("server-error", LANG));
    assert_eq!(h.position().await?, Position::AwaitingStart);
    assert_eq!(h.offset().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_delivery_failure_keeps_state() -> Result<()> {
    let h = Harness::new();
    h.gateway.fail_delivery.store(true, Ordering::SeqCst);

    h.say("привет").await;
    assert_eq!(h.gateway.count(), 0);
    assert_eq!(h.position().await?, Position::AwaitingStart);
    Ok(())
}

#[tokio::test]
async fn test_batch_runs_in_order() -> Result<()> {
    let h = Harness::new();
    let locks = Arc::new(UserLocks::new());
    let batch = UserBatch {
        user_id: USER,
        texts: vec!["привет".to_string(), "старт".to_string(), "москва".to_string()],
    };

    message_handler(Arc::clone(&h.dialogue), locks, batch).await;
    assert_eq!(h.position().await?, Position::AwaitingAgeRange);
    assert_eq!(
        h.gateway.texts(),
        vec![
            t_lang("welcome", LANG),
            t_lang("prompt-city", LANG),
            t_lang("prompt-age-range", LANG),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_concurrent_batches_for_same_user() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 0).await?;
    for offset in 0..4 {
        h.vk.add_candidate(offset, 2000 + offset as i64);
    }
    let locks = Arc::new(UserLocks::new());

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            tokio::spawn(message_handler(
                Arc::clone(&h.dialogue),
                Arc::clone(&locks),
                UserBatch {
                    user_id: USER,
                    texts: vec!["далее".to_string()],
                },
            ))
        })
        .collect();
    for task in tasks {
        task.await?;
    }

    // Every turn saw the previous turn's offset, so no candidate repeats
    assert_eq!(h.offset().await?, 4);
    let mut shown = h.store.avoid_list(USER).await?;
    shown.sort();
    assert_eq!(shown, vec![2000, 2001, 2002, 2003]);
    Ok(())
}

#[tokio::test]
async fn test_photo_lookup_failure_suppresses_offer() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 0).await?;
    h.vk.add_candidate(0, 310);
    h.vk.fail_photos.store(true, Ordering::SeqCst);

    h.say("далее").await;
    assert_eq!(h.gateway.count(), 0);
    assert_eq!(h.position().await?, Position::Browsing);
    assert_eq!(h.offset().await?, 1);
    assert!(h.store.latest_candidate(USER).await?.is_none());
    assert!(h.store.avoid_list(USER).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_delivery_failure_during_removal_keeps_state() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::AwaitingRemovalId, 0).await?;
    h.store.add_favorite(USER, &candidate(555)).await?;
    h.vk.add_candidate(0, 600);
    h.gateway.fail_delivery.store(true, Ordering::SeqCst);

    h.say("555").await;
    assert!(h.store.favorites(USER).await?.is_empty());
    assert_eq!(h.position().await?, Position::Browsing);

    // Once delivery works again the user keeps browsing
    h.gateway.fail_delivery.store(false, Ordering::SeqCst);
    h.say("далее").await;
    assert!(h.gateway.last().unwrap().text.contains("@id600"));
    Ok(())
}

#[tokio::test]
async fn test_delivery_failure_when_listing_favorites() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 0).await?;
    h.gateway.fail_delivery.store(true, Ordering::SeqCst);

    h.say("список избранных").await;
    assert_eq!(h.gateway.count(), 0);
    assert_eq!(h.position().await?, Position::ViewingFavorites);
    Ok(())
}

#[tokio::test]
async fn test_blank_city_input_is_rejected() -> Result<()> {
    let h = Harness::new();
    h.say("привет").await;
    h.say("старт").await;

    h.say("   ").await;
    assert_eq!(h.gateway.last().unwrap().text, t_lang("city-unknown", LANG));
    assert_eq!(h.position().await?, Position::AwaitingCity);
    let profile = h.store.get_profile(USER).await?.expect("profile");
    assert_eq!(profile.city_id, None);
    Ok(())
}

#[tokio::test]
async fn test_exit_recovers_from_invalid_position() -> Result<()> {
    let h = Harness::new();
    h.seed_user(Position::Browsing, 0).await?;
    h.store.set_position_code(USER, 42).await;

    // The position is loaded before greetings are recognized
    h.say("привет").await;
    assert_eq!(h.gateway.last().unwrap().text, t_lang("server-error", LANG));
    assert!(h.store.get_position(USER).await.is_err());

    h.say("пока").await;
    assert_eq!(h.gateway.last().unwrap().text, t_lang("goodbye", LANG));
    assert_eq!(h.position().await?, Position::Fresh);
    Ok(())
}
