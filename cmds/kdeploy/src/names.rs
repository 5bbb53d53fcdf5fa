//! Human-readable release names.

use rand::seq::IndexedRandom;

use crate::context::NameGenerator;

const ADJECTIVES: &[&str] = &[
	"agile", "ample", "bold", "brave", "bright", "calm", "clever", "cosmic", "crisp", "daring",
	"eager", "early", "fancy", "fierce", "gentle", "giddy", "golden", "happy", "hardy", "humble",
	"jolly", "keen", "kind", "lively", "lucky", "mellow", "merry", "mighty", "nimble", "noble",
	"plucky", "polite", "proud", "quick", "quiet", "rapid", "ready", "rustic", "shiny", "silent",
	"sleek", "snowy", "solid", "sunny", "swift", "tidy", "vivid", "warm", "wise", "zesty",
];

const NOUNS: &[&str] = &[
	"badger", "beaver", "bison", "cobra", "condor", "coyote", "crane", "dingo", "dolphin",
	"eagle", "falcon", "ferret", "finch", "gecko", "gopher", "heron", "hornet", "ibis", "jackal",
	"koala", "lemur", "lynx", "magpie", "marmot", "marten", "mink", "moose", "narwhal", "newt",
	"ocelot", "orca", "osprey", "otter", "panda", "parrot", "pelican", "puffin", "quokka",
	"raven", "salmon", "seal", "sparrow", "stoat", "tapir", "tiger", "toucan", "walrus", "wombat",
	"yak", "zebra",
];

/// Generates `<adjective>-<noun>` names from a thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordPairGenerator;

impl NameGenerator for WordPairGenerator {
	fn generate(&self) -> String {
		let mut rng = rand::rng();
		let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("brave");
		let noun = NOUNS.choose(&mut rng).copied().unwrap_or("otter");
		format!("{adjective}-{noun}")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::Context;

	#[test]
	fn test_generated_names_are_two_lowercase_words() {
		for _ in 0..100 {
			let name = WordPairGenerator.generate();
			let (adjective, noun) = name.split_once('-').unwrap();
			assert!(ADJECTIVES.contains(&adjective), "{name}");
			assert!(NOUNS.contains(&noun), "{name}");
			assert_eq!(name, name.to_lowercase());
		}
	}

	#[test]
	fn test_generated_names_are_valid_releases() {
		for _ in 0..100 {
			Context::new("", "", &WordPairGenerator).unwrap();
		}
	}
}
