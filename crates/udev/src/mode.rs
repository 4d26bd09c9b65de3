//! Invocation mode selection

/// How this process was invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Called by the kernel hotplug helper with the subsystem as sole argument
    Hotplug,
    /// Called by a user or script with options
    Interactive,
}

impl InvocationMode {
    /// Classify a raw argument vector (program name included)
    ///
    /// Exactly one argument that does not start with `-` means hotplug;
    /// everything else is interactive.
    pub fn select<S: AsRef<str>>(args: &[S]) -> Self {
        match args {
            [_, arg] if !arg.as_ref().starts_with('-') => InvocationMode::Hotplug,
            _ => InvocationMode::Interactive,
        }
    }
}
