//! Context Assembler: builds the
//! provider message list in fixed order — soul, summary, memory, window,
//! current turn, tool section — applying per-section character budgets
//! from `WorkspaceConfig::context.budget` and dropping whole sections from
//! the lowest-priority end (tools, then window, then memory, then
//! summary) when the total would overrun `totalChars`. Soul is never
//! truncated away: it's the one section the loop cannot run without.

use std::path::Path;

use tracing::info;

use msgcode_core::config::{BudgetSection, MemoryInjectSection};
use msgcode_memory::MemoryStore;

use crate::prompt::resolve_soul;
use crate::provider::{Message, Role, ToolDefinition};
use crate::window::{ConversationWindow, WindowTurn};

pub struct AssembledContext {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// One section's rendered text plus the byte budget it was allotted, used
/// to decide what to drop first when the assembly overruns.
struct Section {
    name: &'static str,
    text: String,
    priority: u8,
}

pub struct ContextAssembler<'a> {
    pub memory: Option<&'a MemoryStore>,
    pub window: &'a ConversationWindow,
    pub tools: Vec<ToolDefinition>,
}

impl<'a> ContextAssembler<'a> {
    pub async fn assemble(
        &self,
        workspace_path: &Path,
        chat_id: &str,
        user_text: &str,
        budget: &BudgetSection,
        memory_inject: &MemoryInjectSection,
    ) -> AssembledContext {
        let total = budget.total_chars.max(1) as usize;
        let resolved_soul = resolve_soul(workspace_path);
        let soul_source = resolved_soul.source;
        let soul_path = resolved_soul.path.map(|p| p.display().to_string());
        let soul = cap(&resolved_soul.text, frac(total, budget.soul));
        let soul_chars = soul.len();

        let summary_text = self.window.summary(chat_id).unwrap_or_default();
        let summary = cap(&summary_text, frac(total, budget.summary));

        let (memory_text, memory_hit_count) = if memory_inject.enabled {
            self.inject_memory(user_text, memory_inject).await
        } else {
            (String::new(), 0)
        };
        let memory_injected_chars = memory_text.len();
        let memory = cap(&memory_text, frac(total, budget.memory).min(memory_inject.max_chars as usize));

        let window_turns = self.window.turns(chat_id);
        let window_text = render_window(&window_turns);
        let window = cap(&window_text, frac(total, budget.window));

        let tools_text = render_tool_section(&self.tools);
        let tools_section = cap(&tools_text, frac(total, budget.tools));

        let mut sections = vec![
            Section { name: "soul", text: soul, priority: 0 },
            Section { name: "summary", text: summary, priority: 1 },
            Section { name: "memory", text: memory, priority: 2 },
            Section { name: "window", text: window, priority: 3 },
            Section { name: "tools", text: tools_section, priority: 4 },
        ];
        drop_from_lowest_priority(&mut sections, total);

        let mut system = String::new();
        let mut provenance = Vec::new();
        for section in &sections {
            if section.text.is_empty() {
                continue;
            }
            system.push_str(&section.text);
            system.push_str("\n\n");
        }
        for dropped in sections.iter().filter(|s| s.text.is_empty() && s.name != "soul") {
            provenance.push(format!("[{} truncated]", dropped.name));
        }
        if !provenance.is_empty() {
            system.push_str(&provenance.join(" "));
        }

        let mut messages = vec![Message { role: Role::System, content: system }];
        for turn in &window_turns {
            messages.push(Message { role: Role::User, content: turn.user_text.clone() });
            messages.push(Message { role: Role::Assistant, content: turn.assistant_text.clone() });
        }
        messages.push(Message { role: Role::User, content: user_text.to_string() });

        info!(
            chat_id,
            memory_injected = !memory_text.is_empty(),
            memory_hit_count,
            memory_injected_chars,
            window_turns = window_turns.len(),
            soul_source = %soul_source,
            soul_path = soul_path.as_deref().unwrap_or(""),
            soul_chars,
            "context assembled"
        );

        AssembledContext { messages, tools: self.tools.clone() }
    }

    async fn inject_memory(&self, query: &str, cfg: &MemoryInjectSection) -> (String, usize) {
        let Some(store) = self.memory else {
            return (String::new(), 0);
        };
        let hits = store.search(query, cfg.top_k as usize).await;
        if hits.is_empty() {
            return (String::new(), 0);
        }
        let hit_count = hits.len();
        let mut out = String::from("## Relevant memory\n\n");
        for hit in hits {
            out.push_str("- ");
            out.push_str(&hit.text);
            out.push('\n');
        }
        (out, hit_count)
    }
}

fn frac(total: usize, fraction: f32) -> usize {
    ((total as f32) * fraction).round().max(0.0) as usize
}

fn cap(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

fn render_window(turns: &[WindowTurn]) -> String {
    if turns.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Recent conversation\n\n");
    for turn in turns {
        out.push_str(&format!("User: {}\nAssistant: {}\n", turn.user_text, turn.assistant_text));
    }
    out
}

fn render_tool_section(tools: &[ToolDefinition]) -> String {
    if tools.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Available tools\n\n");
    for tool in tools {
        out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
    }
    out
}

/// Drop whole sections (setting their text to empty) from lowest priority
/// up until the combined length fits `total`, or only `soul` remains.
fn drop_from_lowest_priority(sections: &mut [Section], total: usize) {
    loop {
        let combined: usize = sections.iter().map(|s| s.text.len()).sum();
        if combined <= total {
            return;
        }
        let Some(victim) = sections
            .iter_mut()
            .filter(|s| s.priority > 0 && !s.text.is_empty())
            .max_by_key(|s| s.priority)
        else {
            return;
        };
        victim.text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_truncates_to_char_count() {
        assert_eq!(cap("hello world", 5), "hello");
        assert_eq!(cap("hi", 5), "hi");
    }

    #[test]
    fn drop_from_lowest_priority_keeps_soul_last() {
        let mut sections = vec![
            Section { name: "soul", text: "s".repeat(100), priority: 0 },
            Section { name: "tools", text: "t".repeat(100), priority: 4 },
        ];
        drop_from_lowest_priority(&mut sections, 100);
        assert!(sections[1].text.is_empty());
        assert!(!sections[0].text.is_empty());
    }
}
