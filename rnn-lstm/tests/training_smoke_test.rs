//! Training smoke tests: a few hundred SGD steps on a learnable corpus.

mod common;

use common::Sgd;
use rnn_lstm::{eval_perplexity, CorpusWindows, LanguageModel, TbpttTrainer, TrainConfig};

fn train_config() -> TrainConfig {
    TrainConfig { batch_size: 2, time_size: 5, max_grad: Some(1.0), eval_interval: 0 }
}

#[test]
fn perplexity_falls_on_a_periodic_corpus() {
    let corpus = common::cyclic_corpus(161, common::VOCAB);
    let mut model = LanguageModel::new(common::tiny_config(42)).unwrap();
    let mut trainer = TbpttTrainer::new(train_config(), Sgd { lr: 1.0 }).unwrap();

    let history = trainer.fit(&mut model, &corpus, 12).unwrap().to_vec();
    assert_eq!(history.len(), 12);
    assert!(history.iter().all(|p| p.is_finite()));
    let (first, last) = (history[0], history[history.len() - 1]);
    assert!(last < first, "perplexity did not fall: {first} -> {last}");
}

#[test]
fn trained_model_beats_untrained_on_held_out_text() {
    let train = common::cyclic_corpus(161, common::VOCAB);
    let held_out = common::cyclic_corpus(81, common::VOCAB);

    let mut model = LanguageModel::new(common::tiny_config(7)).unwrap();
    let before = eval_perplexity(&mut model, &held_out, 2, 5).unwrap();

    let mut trainer = TbpttTrainer::new(train_config(), Sgd { lr: 1.0 }).unwrap();
    trainer.fit(&mut model, &train, 12).unwrap();
    model.reset_state();
    let after = eval_perplexity(&mut model, &held_out, 2, 5).unwrap();
    assert!(after < before, "held-out perplexity {before} -> {after}");
}

#[test]
fn manual_steps_match_the_window_schedule() {
    let corpus = common::cyclic_corpus(41, common::VOCAB);
    let windows = CorpusWindows::new(&corpus, 2, 5).unwrap();
    let mut model = LanguageModel::new(common::tiny_config(1)).unwrap();
    let mut trainer = TbpttTrainer::new(train_config(), Sgd { lr: 0.1 }).unwrap();
    for k in 0..windows.max_iters() {
        assert_eq!(trainer.time_idx(), k * 5);
        let stats = trainer.step(&mut model, &windows).unwrap();
        assert!(stats.loss.is_finite());
        assert!(stats.grad_norm > 0.0);
    }
}
