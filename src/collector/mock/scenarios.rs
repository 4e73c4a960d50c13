//! Pre-built mock filesystem scenarios for testing.

use super::filesystem::MockFs;

/// Kernel id embedded in the connection file of PID 2001 in
/// [`MockFs::notebook_server`].
pub const NOTEBOOK_KERNEL_A: &str = "0f5e6a1c-4b6e-4f0a-9d2c-3b8e2c1f9a11";
/// Kernel id embedded in the connection file of PID 2002 in
/// [`MockFs::notebook_server`].
pub const NOTEBOOK_KERNEL_B: &str = "7b1d9e44-2a3c-4d5e-8f60-a1b2c3d4e5f6";

impl MockFs {
    /// Adds a process from its essentials, generating `stat`, `status` and
    /// `cmdline` in kernel format.
    pub fn add_simple_process(&mut self, pid: u32, ppid: u32, args: &[&str], rss_kb: u64) {
        let comm = args
            .first()
            .and_then(|arg| arg.rsplit('/').next())
            .unwrap_or("kthread");
        let comm: String = comm.chars().take(15).collect();

        let stat = format!(
            "{pid} ({comm}) S {ppid} {pid} {pid} 0 -1 4194304 100 0 0 0 10 5 0 0 20 0 1 0 12345 \
             {vsize} {pages} 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 \
             0 0 0 0",
            vsize = rss_kb * 4 * 1024,
            pages = rss_kb / 4,
        );
        let status = format!(
            "Name:\t{comm}\nPid:\t{pid}\nPPid:\t{ppid}\nVmSize:\t{vm} kB\nVmRSS:\t{rss_kb} kB\n\
             RssFile:\t{file} kB\nRssShmem:\t0 kB\nVmData:\t{data} kB\nVmSwap:\t0 kB\n",
            vm = rss_kb * 4,
            file = rss_kb / 8,
            data = rss_kb / 2,
        );
        let cmdline: String = args.iter().map(|arg| format!("{arg}\0")).collect();

        self.add_process(pid, &stat, &status, &cmdline);
    }

    /// A notebook server with two kernels.
    ///
    /// ```text
    /// 1     /sbin/init                      10000 kB
    /// ├─ 2000  jupyter-notebook             80000 kB
    /// │  ├─ 2001  ipykernel (kernel A)      48000 kB
    /// │  └─ 2002  ipykernel (kernel B)      64000 kB
    /// │     └─ 2003  /bin/sh -c make         2000 kB
    /// └─ 2100  sshd                          6000 kB
    /// ```
    ///
    /// `MemTotal` is 16 GiB.
    pub fn notebook_server() -> Self {
        let mut fs = Self::new();

        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16777216 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
",
        );

        let connection_a =
            format!("/home/user/.local/share/jupyter/runtime/kernel-{NOTEBOOK_KERNEL_A}.json");
        let connection_b =
            format!("/home/user/.local/share/jupyter/runtime/kernel-{NOTEBOOK_KERNEL_B}.json");

        fs.add_simple_process(1, 0, &["/sbin/init"], 10_000);
        fs.add_simple_process(
            2000,
            1,
            &[
                "/usr/bin/python3",
                "/usr/local/bin/jupyter-notebook",
                "--no-browser",
            ],
            80_000,
        );
        fs.add_simple_process(
            2001,
            2000,
            &[
                "/usr/bin/python3",
                "-m",
                "ipykernel_launcher",
                "-f",
                connection_a.as_str(),
            ],
            48_000,
        );
        fs.add_simple_process(
            2002,
            2000,
            &[
                "/usr/bin/python3",
                "-m",
                "ipykernel_launcher",
                "-f",
                connection_b.as_str(),
            ],
            64_000,
        );
        fs.add_simple_process(2003, 2002, &["/bin/sh", "-c", "make"], 2_000);
        fs.add_simple_process(2100, 1, &["/usr/sbin/sshd", "-D"], 6_000);

        fs
    }
}
