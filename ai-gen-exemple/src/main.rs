use std::io::Write;
use std::sync::Arc;

use ai_gen_core::corpus::Corpus;
use ai_gen_core::model::sampler::Sampler;
use ai_gen_core::model::transition_table::{TransitionTable, DEFAULT_ORDER};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The prompt can be given as the first argument
    let prompt = std::env::args().nth(1).unwrap_or_else(|| "The future".to_string());

    // Load the corpus and build the word-level transition table (2 words of context)
    let corpus = Corpus::load("./corpus/sample.txt")?;
    let table = Arc::new(TransitionTable::build(&corpus, DEFAULT_ORDER)?);
    println!("{} tokens, {} prefixes", corpus.len(), table.len());

    // A fixed seed always gives the same text for the same prompt
    let seeded = Sampler::from_prompt(table.clone(), &prompt, 20, 0.7, StdRng::seed_from_u64(42));
    println!("Seeded: {} {}", prompt, seeded.collect::<Vec<_>>().join(" "));

    // Temperature near 0 keeps the most frequent continuation, 2.0 flattens the distribution
    for temperature in [0.05, 0.7, 2.0] {
        let sampler = Sampler::from_prompt(table.clone(), &prompt, 20, temperature, StdRng::from_os_rng());
        println!("T={temperature}: {} {}", prompt, sampler.collect::<Vec<_>>().join(" "));
    }

    // Stream tokens one by one, the way the server sends them
    print!("Streaming: {prompt} ");
    for token in Sampler::from_prompt(table, &prompt, 40, 0.7, StdRng::from_os_rng()) {
        print!("{token} ");
        std::io::stdout().flush()?;
    }
    println!();

    Ok(())
}
