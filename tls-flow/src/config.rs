use derive_builder::Builder;

/// Configuration for a [`TlsDataFlow`](crate::TlsDataFlow).
#[derive(Debug, Clone, Builder)]
pub struct TlsFlowConfig {
    /// Ciphertext chunk size requested from the inner flow per read.
    #[builder(default = "8192")]
    read_chunk_size: usize,
    /// Overrides the SNI / certificate-validation name derived from the
    /// endpoint host.
    #[builder(default, setter(into, strip_option))]
    server_name: Option<String>,
}

impl TlsFlowConfig {
    /// Creates a builder for the configuration.
    pub fn builder() -> TlsFlowConfigBuilder {
        TlsFlowConfigBuilder::default()
    }

    /// Ciphertext chunk size requested from the inner flow per read.
    pub fn read_chunk_size(&self) -> usize {
        self.read_chunk_size
    }

    /// SNI override, if any.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }
}

impl Default for TlsFlowConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 8192,
            server_name: None,
        }
    }
}
