use super::{
    agent_over, agent_with, echo_answer, handbook, memory_agent, test_config, CountingProvider,
    ScriptedLlm, UnreachableStore,
};
use crate::conversation::MemoryConversationStore;
use crate::conversation::{ConversationStore, Role, SqliteConversationStore};
use crate::orchestrator::{AgentMode, QueryRequest};
use docent_core::AppError;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn grounded_answer_carries_provenance() {
    let llm = Arc::new(ScriptedLlm::echo());
    let agent = memory_agent(Arc::new(CountingProvider::new(256)), llm.clone());
    agent.knowledge.ingestor.ingest(&handbook()).await.unwrap();

    let request = QueryRequest::new("c1", "How many vacation days does an employee accrue?")
        .with_min_score(0.0);
    let response = agent.orchestrator.handle_query(&request).await.unwrap();

    assert!(response.grounded);
    assert!(!response.provenance.is_empty());
    assert!(response.provenance.len() <= test_config().retrieval.top_k);
    assert!(response.provenance.iter().all(|p| p.document_id == "handbook"));
    assert!(response
        .provenance
        .windows(2)
        .all(|w| w[0].score >= w[1].score));

    let prompt = llm.last_prompt();
    assert!(prompt.contains("[1] document=handbook"));
    assert!(prompt.contains(&format!("chunk={}", response.provenance[0].chunk_id)));

    // Provenance mirrors the retrieval recorded with the answer
    let history = agent
        .orchestrator
        .conversations()
        .get_history("c1", usize::MAX)
        .await
        .unwrap();
    let recorded = history[1].retrieval.as_ref().unwrap().provenance();
    let returned: Vec<(String, String, f32)> = response
        .provenance
        .iter()
        .map(|p| (p.document_id.clone(), p.chunk_id.clone(), p.score))
        .collect();
    assert_eq!(returned, recorded);
}

#[tokio::test]
async fn rag_disabled_never_touches_the_embedder() {
    let provider = Arc::new(CountingProvider::new(256));
    let llm = Arc::new(ScriptedLlm::echo());
    let agent = memory_agent(provider.clone(), llm.clone());
    agent.knowledge.ingestor.ingest(&handbook()).await.unwrap();
    let after_ingest = provider.calls();

    let request = QueryRequest::new("c1", "Tell me a joke").with_mode(AgentMode::RagDisabled);
    let response = agent.orchestrator.handle_query(&request).await.unwrap();

    assert_eq!(provider.calls(), after_ingest);
    assert!(!response.grounded);
    assert!(response.provenance.is_empty());
    assert_eq!(response.response_text, echo_answer("Tell me a joke"));

    let prompt = llm.last_prompt();
    assert!(!prompt.contains("Context passages"));
    assert!(!prompt.contains("No relevant passages"));
}

#[tokio::test]
async fn nothing_above_threshold_is_ungrounded() {
    let llm = Arc::new(ScriptedLlm::echo());
    let agent = memory_agent(Arc::new(CountingProvider::new(256)), llm.clone());
    agent.knowledge.ingestor.ingest(&handbook()).await.unwrap();

    let request = QueryRequest::new("c1", "quantum chromodynamics on a lattice")
        .with_min_score(0.95);
    let response = agent.orchestrator.handle_query(&request).await.unwrap();

    assert!(!response.grounded);
    assert!(response.provenance.is_empty());
    assert!(llm.last_prompt().contains("No relevant passages"));

    // Ungrounded answers are still recorded
    assert_eq!(agent.orchestrator.turn_count("c1").await.unwrap(), 2);
}

#[tokio::test]
async fn generation_failure_leaves_history_unchanged() {
    let llm = Arc::new(ScriptedLlm::failing(usize::MAX));
    let agent = memory_agent(Arc::new(CountingProvider::new(256)), llm.clone());

    let result = agent
        .orchestrator
        .handle_query(&QueryRequest::new("c1", "Anyone there?"))
        .await;

    assert!(matches!(result, Err(AppError::GenerationService(_))));
    // One attempt plus one retry
    assert_eq!(llm.calls(), 2);
    assert_eq!(agent.orchestrator.turn_count("c1").await.unwrap(), 0);
}

#[tokio::test]
async fn transient_generation_failure_is_retried() {
    let llm = Arc::new(ScriptedLlm::failing(1));
    let agent = memory_agent(Arc::new(CountingProvider::new(256)), llm.clone());

    let response = agent
        .orchestrator
        .handle_query(&QueryRequest::new("c1", "Anyone there?"))
        .await
        .unwrap();

    assert_eq!(llm.calls(), 2);
    assert_eq!(response.response_text, echo_answer("Anyone there?"));
    assert_eq!(agent.orchestrator.turn_count("c1").await.unwrap(), 2);
}

#[tokio::test]
async fn blank_query_is_rejected_before_any_work() {
    let provider = Arc::new(CountingProvider::new(256));
    let llm = Arc::new(ScriptedLlm::echo());
    let agent = memory_agent(provider.clone(), llm.clone());

    let result = agent
        .orchestrator
        .handle_query(&QueryRequest::new("c1", "   "))
        .await;

    assert!(matches!(result, Err(AppError::InvalidQuery(_))));
    assert_eq!(provider.calls(), 0);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn previous_turns_reach_the_prompt() {
    let llm = Arc::new(ScriptedLlm::echo());
    let agent = memory_agent(Arc::new(CountingProvider::new(256)), llm.clone());

    let first = QueryRequest::new("c1", "My name is Ada").with_mode(AgentMode::RagDisabled);
    agent.orchestrator.handle_query(&first).await.unwrap();

    let second = QueryRequest::new("c1", "What is my name?").with_mode(AgentMode::RagDisabled);
    agent.orchestrator.handle_query(&second).await.unwrap();

    let prompt = llm.last_prompt();
    assert!(prompt.contains("user: My name is Ada"));
    assert!(prompt.contains(&format!("assistant: {}", echo_answer("My name is Ada"))));

    // Other conversations stay separate
    let other = QueryRequest::new("c2", "What is my name?").with_mode(AgentMode::RagDisabled);
    agent.orchestrator.handle_query(&other).await.unwrap();
    assert!(!llm.last_prompt().contains("My name is Ada"));
}

#[tokio::test]
async fn dropped_query_records_nothing() {
    let llm = Arc::new(ScriptedLlm::slow(Duration::from_secs(5)));
    let agent = memory_agent(Arc::new(CountingProvider::new(256)), llm.clone());

    let request = QueryRequest::new("c1", "Take your time").with_mode(AgentMode::RagDisabled);
    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        agent.orchestrator.handle_query(&request),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(llm.calls(), 1);
    assert_eq!(agent.orchestrator.turn_count("c1").await.unwrap(), 0);
}

#[tokio::test]
async fn answers_survive_a_restart_with_sqlite() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("conversations.db");

    {
        let store: Arc<dyn ConversationStore> =
            Arc::new(SqliteConversationStore::open(&path).unwrap());
        let agent = agent_with(
            Arc::new(CountingProvider::new(256)),
            Arc::new(ScriptedLlm::echo()),
            store,
        );
        agent.knowledge.ingestor.ingest(&handbook()).await.unwrap();
        let request = QueryRequest::new("c1", "How are expense reports filed?")
            .with_min_score(0.0);
        agent.orchestrator.handle_query(&request).await.unwrap();
    }

    let reopened = SqliteConversationStore::open(&path).unwrap();
    let turns = reopened.turns("c1").await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].text, "How are expense reports filed?");
    assert_eq!(turns[1].role, Role::Assistant);
    assert!(!turns[1].retrieval.as_ref().unwrap().is_empty());
}

#[tokio::test]
async fn embedding_outage_fails_the_turn_without_recording_it() {
    let provider = Arc::new(CountingProvider::failing(256));
    let llm = Arc::new(ScriptedLlm::echo());
    let agent = memory_agent(provider.clone(), llm.clone());

    let result = agent
        .orchestrator
        .handle_query(&QueryRequest::new("c1", "How many vacation days?"))
        .await;

    assert!(matches!(result, Err(AppError::EmbeddingService(_))));
    assert_eq!(provider.calls(), 1);
    assert_eq!(llm.calls(), 0);
    assert_eq!(agent.orchestrator.turn_count("c1").await.unwrap(), 0);
}

#[tokio::test]
async fn unreachable_index_fails_the_turn_without_recording_it() {
    let vectors = Arc::new(UnreachableStore::default());
    let llm = Arc::new(ScriptedLlm::echo());
    let agent = agent_over(
        Arc::new(CountingProvider::new(256)),
        llm.clone(),
        vectors.clone(),
        Arc::new(MemoryConversationStore::new()),
    );

    let result = agent
        .orchestrator
        .handle_query(&QueryRequest::new("c1", "How many vacation days?"))
        .await;

    assert!(matches!(result, Err(AppError::IndexUnavailable(_))));
    assert!(vectors.calls() >= 1);
    assert_eq!(llm.calls(), 0);
    assert_eq!(agent.orchestrator.turn_count("c1").await.unwrap(), 0);

    // The same agent still answers with retrieval turned off
    let response = agent
        .orchestrator
        .handle_query(
            &QueryRequest::new("c1", "Hello?").with_mode(AgentMode::RagDisabled),
        )
        .await
        .unwrap();
    assert!(!response.grounded);
    assert_eq!(agent.orchestrator.turn_count("c1").await.unwrap(), 2);
}
