//! Property tests for document synthesis

use codecore_document::{DocumentSynthesizer, InstrumentationInjector, SourceText};
use codecore_profile::{FrameworkResolver, ProfileRegistry, Selection};
use proptest::prelude::*;

fn any_selection() -> impl Strategy<Value = Selection> {
    prop_oneof![
        Just(Selection::Auto),
        Just(Selection::profile("vanilla")),
        Just(Selection::profile("threejs")),
        "[a-z]{1,8}".prop_map(Selection::profile),
    ]
}

proptest! {
    #[test]
    fn synthesis_is_pure(source in ".{0,200}", selection in any_selection()) {
        let registry = ProfileRegistry::with_defaults();
        let resolver = FrameworkResolver::from_registry(&registry).unwrap();
        let profile = registry.lookup(resolver.resolve(&source, &selection).as_str());

        let source = SourceText::from(source);
        let fragment = InstrumentationInjector::new().produce(profile);
        let synthesizer = DocumentSynthesizer::new();

        let first = synthesizer.synthesize(profile, &fragment, &source).unwrap();
        let second = synthesizer.synthesize(profile, &fragment, &source).unwrap();

        prop_assert_eq!(first.text(), second.text());
        prop_assert_eq!(first.digest(), second.digest());
    }

    #[test]
    fn user_code_follows_instrumentation(source in "[a-zA-Z0-9 ;().=]{0,120}") {
        let registry = ProfileRegistry::with_defaults();
        let profile = registry.default_profile();
        let fragment = InstrumentationInjector::new().produce(profile);
        let document = DocumentSynthesizer::new()
            .synthesize(profile, &fragment, &SourceText::from(source.as_str()))
            .unwrap();

        let script = document.script();
        let sink = script.find("var __codecore_sink").unwrap();
        let open = script.find("\ntry {\n").unwrap();
        let code = open + "\ntry {\n".len();

        prop_assert_eq!(sink, 0);
        prop_assert!(script[code..].starts_with(source.as_str()));
    }

    #[test]
    fn every_profile_renders_both_panels(selection in any_selection()) {
        let registry = ProfileRegistry::with_defaults();
        let resolver = FrameworkResolver::from_registry(&registry).unwrap();
        let profile = registry.lookup(resolver.resolve("", &selection).as_str());
        let fragment = InstrumentationInjector::new().produce(profile);
        let document = DocumentSynthesizer::new()
            .synthesize(profile, &fragment, &SourceText::default())
            .unwrap();

        prop_assert!(document.text().contains("<div id=\"error\" style=\"display:none;\"></div>"));
        prop_assert!(document.text().contains("<div id=\"console\"></div>"));
    }
}
