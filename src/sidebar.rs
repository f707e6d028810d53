// Static sidebar catalog. Every action here only produces an acknowledgment
// message; nothing is loaded, indexed or stored.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KnowledgeBase {
    pub name: &'static str,
    pub icon: &'static str,
    pub items: &'static [&'static str],
}

pub const KNOWLEDGE_BASES: &[KnowledgeBase] = &[
    KnowledgeBase {
        name: "Playbooks",
        icon: "📖",
        items: &["Marketing Playbook", "Sales Process", "Brand Guidelines"],
    },
    KnowledgeBase {
        name: "Client Wikis",
        icon: "📝",
        items: &["Client A Wiki", "Client B Wiki", "Industry Research"],
    },
    KnowledgeBase {
        name: "Campaign Docs",
        icon: "📊",
        items: &["Q4 Campaign", "Social Media Strategy", "Email Templates"],
    },
    KnowledgeBase {
        name: "SOPs",
        icon: "📋",
        items: &["Content Creation SOP", "Client Onboarding", "Reporting Process"],
    },
];

pub const RECENT_CHATS: &[&str] = &[
    "Content Strategy Discussion",
    "Ad Copy Generation",
    "Client Onboarding Help",
    "Campaign Performance Review",
];

pub const ACCEPTED_ATTACHMENTS: &[&str] = &["pdf", "txt", "docx", "csv"];

/// Shown next to the model controls; not derived from any selection.
pub const ACTIVE_KB_BADGE: &str = "KBs active: 2";
pub const BRAND_NOTE: &str = "Lato & Bebas Neue • Deep/Mid/Light blues, Tint, Canvas";

#[derive(Debug, Clone, PartialEq)]
pub enum Acknowledgment {
    Info(String),
    Success(String),
    Rejected(String),
}

pub fn find_knowledge_base(name: &str) -> Option<&'static KnowledgeBase> {
    KNOWLEDGE_BASES.iter().find(|kb| kb.name == name)
}

pub fn select_knowledge_base(name: &str) -> Acknowledgment {
    match find_knowledge_base(name) {
        Some(kb) => Acknowledgment::Info(format!("{}: {}", kb.name, kb.items.join(", "))),
        None => Acknowledgment::Info(format!("Knowledge base '{}' not found", name)),
    }
}

pub fn add_knowledge_base() -> Acknowledgment {
    Acknowledgment::Info("Upload documents to knowledge base".to_string())
}

pub fn build_rag() -> Acknowledgment {
    Acknowledgment::Info("RAG system building...".to_string())
}

pub fn open_recent(title: &str) -> Acknowledgment {
    if RECENT_CHATS.contains(&title) {
        Acknowledgment::Info(format!("Loading {}...", title))
    } else {
        Acknowledgment::Info(format!("Recent chat '{}' not found", title))
    }
}

/// Accepts or rejects an attachment by extension. The file contents are never
/// read; only the name is echoed back.
pub fn attach(file_name: &str) -> Acknowledgment {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if ACCEPTED_ATTACHMENTS.contains(&ext.as_str()) => {
            Acknowledgment::Success(format!("File uploaded: {}", file_name))
        }
        _ => Acknowledgment::Rejected(format!(
            "Unsupported file type for {}; accepted types: {}",
            file_name,
            ACCEPTED_ATTACHMENTS.join(", ")
        )),
    }
}
