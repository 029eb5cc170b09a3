use std::collections::BTreeMap;

use aidevs_context::contract::{
    FetchError, MockContentFetcher, MockImageDescriber, MockKeyValueStore, MockTranscriber,
    PipelineError, TranscriptionError,
};
use aidevs_context::markdown::ResourceType;
use aidevs_context::resolve::{wrap_attachment, AttachmentResolver, IMAGE_SYSTEM_PROMPT};
use aidevs_context::sections::Section;

const BASE_URL: &str = "https://example.org/dane";

fn fetcher_serving_attachments() -> MockContentFetcher {
    let mut fetcher = MockContentFetcher::new();
    fetcher.expect_fetch().returning(|url: &str| match url {
        "https://example.org/dane/i/market.png" => Ok(b"PNGDATA".to_vec()),
        "https://example.org/dane/i/recording.mp3" => Ok(b"MP3DATA".to_vec()),
        other => Err(FetchError::Status {
            url: other.to_owned(),
            status: 404,
        }),
    });
    fetcher
}

fn describer() -> MockImageDescriber {
    let mut describer = MockImageDescriber::new();
    describer
        .expect_describe_image()
        .returning(|system: &str, image: &[u8], user: &str| {
            assert_eq!(system, IMAGE_SYSTEM_PROMPT);
            assert_eq!(image, b"PNGDATA");
            assert!(user.contains("Market square"));
            Ok("A market square in Kraków.".to_string())
        });
    describer
}

fn transcriber() -> MockTranscriber {
    let mut transcriber = MockTranscriber::new();
    transcriber
        .expect_transcribe()
        .returning(|audio: &[u8], format: &ResourceType| {
            assert_eq!(audio, b"MP3DATA");
            assert_eq!(*format, ResourceType::Mp3);
            Ok("We tasted strawberries.".to_string())
        });
    transcriber
}

#[tokio::test]
async fn replaces_image_and_audio_placeholders_with_delimited_content() {
    let fetcher = fetcher_serving_attachments();
    let describer = describer();
    let transcriber = transcriber();
    let resolver = AttachmentResolver::new(&fetcher, &transcriber, &describer, BASE_URL);

    let mut section = Section::from_text(
        "Results\n\n![Market square](i/market.png)\nListen: [recording](i/recording.mp3)",
    );
    assert_eq!(section.links.len(), 2);

    resolver.resolve_section(&mut section).await.expect("Resolution should succeed");

    let image_block = wrap_attachment(
        "https://example.org/dane/i/market.png",
        "A market square in Kraków.",
    );
    let audio_block = wrap_attachment(
        "https://example.org/dane/i/recording.mp3",
        "We tasted strawberries.",
    );
    assert_eq!(
        section.body,
        format!("Results\n\n{image_block}\nListen: {audio_block}")
    );
    assert_eq!(section.body.matches("<attachment url=").count(), 2);
    assert_eq!(section.body.matches("</attachment>").count(), 2);
    assert!(!section.body.contains("$link_"));
    assert!(section.is_resolved());
}

#[tokio::test]
async fn page_and_unknown_links_are_restored_without_fetching() {
    let mut fetcher = MockContentFetcher::new();
    fetcher.expect_fetch().never();
    let describer = MockImageDescriber::new();
    let transcriber = MockTranscriber::new();
    let resolver = AttachmentResolver::new(&fetcher, &transcriber, &describer, BASE_URL);

    let text = "See [the site](https://example.org) and [plugin](https://github.com/yetone/avante.nvim).";
    let mut section = Section::from_text(text);
    resolver.resolve_section(&mut section).await.unwrap();

    assert_eq!(section.body, text);
    assert!(section.is_resolved());
}

#[tokio::test]
async fn malformed_token_aborts_resolution() {
    let mut fetcher = MockContentFetcher::new();
    fetcher.expect_fetch().never();
    let describer = MockImageDescriber::new();
    let transcriber = MockTranscriber::new();
    let resolver = AttachmentResolver::new(&fetcher, &transcriber, &describer, BASE_URL);

    let mut links = BTreeMap::new();
    links.insert(0, "[broken](https://x.y/a.png".to_string());
    let mut section = Section::new("before $link_0$ after", links);

    let err = resolver.resolve_section(&mut section).await.unwrap_err();
    assert!(matches!(err, PipelineError::Link(_)), "got {err:?}");
    assert_eq!(section.body, "before $link_0$ after");
}

#[tokio::test]
async fn fetch_error_aborts_the_whole_pass() {
    let fetcher = fetcher_serving_attachments();
    let describer = describer();
    let mut transcriber = MockTranscriber::new();
    transcriber.expect_transcribe().never();
    let resolver = AttachmentResolver::new(&fetcher, &transcriber, &describer, BASE_URL);

    let sections = vec![
        Section::from_text("![Market square](i/market.png)"),
        Section::from_text("[missing](i/missing.mp3)"),
    ];
    let err = resolver.resolve_all(sections).await.unwrap_err();
    assert!(
        matches!(err, PipelineError::Fetch(FetchError::Status { status: 404, .. })),
        "got {err:?}"
    );
}

#[tokio::test]
async fn transcription_error_propagates() {
    let fetcher = fetcher_serving_attachments();
    let describer = MockImageDescriber::new();
    let mut transcriber = MockTranscriber::new();
    transcriber
        .expect_transcribe()
        .returning(|_, _| Err(TranscriptionError::Provider("quota exceeded".into())));
    let resolver = AttachmentResolver::new(&fetcher, &transcriber, &describer, BASE_URL);

    let mut section = Section::from_text("[recording](i/recording.mp3)");
    let err = resolver.resolve_section(&mut section).await.unwrap_err();
    assert!(err.to_string().contains("quota exceeded"));
}

#[tokio::test]
async fn resolve_all_keeps_section_order() {
    let fetcher = fetcher_serving_attachments();
    let describer = describer();
    let transcriber = transcriber();
    let resolver = AttachmentResolver::new(&fetcher, &transcriber, &describer, BASE_URL);

    let sections = vec![
        Section::from_text("first [recording](i/recording.mp3)"),
        Section::from_text("second"),
        Section::from_text("third ![Market square](i/market.png)"),
    ];
    let resolved = resolver.resolve_all(sections).await.unwrap();

    assert_eq!(resolved.len(), 3);
    assert!(resolved[0].body.starts_with("first <attachment"));
    assert_eq!(resolved[1].body, "second");
    assert!(resolved[2].body.starts_with("third <attachment"));
    assert!(resolved.iter().all(Section::is_resolved));
}

#[tokio::test]
async fn cached_descriptions_skip_the_fetch() {
    let mut fetcher = MockContentFetcher::new();
    fetcher.expect_fetch().never();
    let describer = MockImageDescriber::new();
    let transcriber = MockTranscriber::new();
    let mut cache = MockKeyValueStore::new();
    cache.expect_get().returning(|key: &str| {
        assert_eq!(key, "https://example.org/dane/i/market.png");
        Ok(Some("cached description".to_string()))
    });
    cache.expect_save().never();

    let resolver =
        AttachmentResolver::new(&fetcher, &transcriber, &describer, BASE_URL).with_cache(&cache);
    let replacement = resolver
        .resolve_link("![Market square](i/market.png)")
        .await
        .unwrap();
    assert_eq!(
        replacement,
        wrap_attachment("https://example.org/dane/i/market.png", "cached description")
    );
}

#[tokio::test]
async fn cache_miss_saves_the_new_description() {
    let fetcher = fetcher_serving_attachments();
    let describer = MockImageDescriber::new();
    let transcriber = transcriber();
    let mut cache = MockKeyValueStore::new();
    cache.expect_get().returning(|_| Ok(None));
    cache
        .expect_save()
        .times(1)
        .returning(|key: &str, value: &str| {
            assert_eq!(key, "https://example.org/dane/i/recording.mp3");
            assert_eq!(value, "We tasted strawberries.");
            Ok(())
        });

    let resolver =
        AttachmentResolver::new(&fetcher, &transcriber, &describer, BASE_URL).with_cache(&cache);
    resolver
        .resolve_link("[recording](i/recording.mp3)")
        .await
        .unwrap();
}

#[tokio::test]
async fn wav_attachments_are_transcribed_with_their_format() {
    let mut fetcher = MockContentFetcher::new();
    fetcher
        .expect_fetch()
        .returning(|_| Ok(b"WAVDATA".to_vec()));
    let describer = MockImageDescriber::new();
    let mut transcriber = MockTranscriber::new();
    transcriber
        .expect_transcribe()
        .times(1)
        .returning(|_, format: &ResourceType| {
            assert_eq!(*format, ResourceType::Wav);
            Ok("wav transcript".to_string())
        });
    let resolver = AttachmentResolver::new(&fetcher, &transcriber, &describer, BASE_URL);

    let replacement = resolver.resolve_link("[call](i/call.wav)").await.unwrap();
    assert_eq!(
        replacement,
        wrap_attachment("https://example.org/dane/i/call.wav", "wav transcript")
    );
}

#[tokio::test]
async fn description_mentioning_a_placeholder_does_not_steal_the_next_slot() {
    let fetcher = fetcher_serving_attachments();
    let mut describer = MockImageDescriber::new();
    describer
        .expect_describe_image()
        .returning(|_, _, _| Ok("a sign reading $link_1$".to_string()));
    let transcriber = transcriber();
    let resolver = AttachmentResolver::new(&fetcher, &transcriber, &describer, BASE_URL);

    let mut section =
        Section::from_text("![Market square](i/market.png) then [recording](i/recording.mp3)");
    resolver.resolve_section(&mut section).await.unwrap();

    let image_block = wrap_attachment(
        "https://example.org/dane/i/market.png",
        "a sign reading $link_1$",
    );
    let audio_block = wrap_attachment(
        "https://example.org/dane/i/recording.mp3",
        "We tasted strawberries.",
    );
    assert_eq!(section.body, format!("{image_block} then {audio_block}"));
    assert!(section.is_resolved());
}
