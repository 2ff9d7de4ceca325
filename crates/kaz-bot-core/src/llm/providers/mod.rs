mod groq;

pub use groq::{GroqProvider, GroqProviderFactory, GROQ_API_BASE};
