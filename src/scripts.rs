//! Shell snippets run on provisioned hosts.
//!
//! Everything here is plain text; nothing is executed. Steps run as root
//! except app management, which runs as the operator's login user.

/// Quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Write `contents` to `path` through a quoted heredoc.
pub fn write_file(path: &str, contents: &str) -> String {
    let mut marker = String::from("DEVBOX_EOF");
    while contents.lines().any(|line| line == marker) {
        marker.push('_');
    }
    format!("cat <<'{marker}' > {path}\n{contents}\n{marker}")
}

pub const UPDATE_PACKAGES: &str = "DEBIAN_FRONTEND=noninteractive apt-get update";

pub const UPGRADE_PACKAGES: &str = "DEBIAN_FRONTEND=noninteractive apt-get -y upgrade";

pub const HARDEN_SSH: &str = "\
sed -i 's/^#\\?TCPKeepAlive.*/TCPKeepAlive yes/' /etc/ssh/sshd_config; \
sed -i 's/^#\\?ClientAliveInterval.*/ClientAliveInterval 60/' /etc/ssh/sshd_config; \
sed -i 's/^#\\?ClientAliveCountMax.*/ClientAliveCountMax 5/' /etc/ssh/sshd_config; \
sed -i 's/^#\\?PasswordAuthentication.*/PasswordAuthentication no/' /etc/ssh/sshd_config; \
mkdir -p /etc/ssh/sshd_config.d; \
echo 'PasswordAuthentication no' > /etc/ssh/sshd_config.d/00-devbox.conf; \
systemctl enable ssh; systemctl restart ssh";

pub const INSTALL_OH_MY_BASH: &str = "\
DEBIAN_FRONTEND=noninteractive apt-get update && \
DEBIAN_FRONTEND=noninteractive apt-get -y install curl git && \
rm -rf /usr/share/oh-my-bash && \
git clone --depth=1 https://github.com/ohmybash/oh-my-bash.git /usr/share/oh-my-bash && \
sed -i 's|^export OSH=.*|export OSH=/usr/share/oh-my-bash|' /usr/share/oh-my-bash/templates/bashrc.osh-template && \
sed -i 's|^OSH_THEME=.*|OSH_THEME=\"90210\"|' /usr/share/oh-my-bash/templates/bashrc.osh-template && \
cp /usr/share/oh-my-bash/templates/bashrc.osh-template /etc/skel/.bashrc && \
cp /usr/share/oh-my-bash/templates/bashrc.osh-template /root/.bashrc";

/// Docker CE from the vendor repository, for Ubuntu and Debian alike.
pub const INSTALL_DOCKER: &str = "\
for pkg in docker.io docker-doc docker-compose docker-compose-v2 podman-docker containerd runc; do apt-get -y remove $pkg; done; \
export DEBIAN_FRONTEND=noninteractive; \
apt-get update && apt-get -y install ca-certificates curl && \
install -m 0755 -d /etc/apt/keyrings && \
. /etc/os-release && \
curl -fsSL https://download.docker.com/linux/$ID/gpg -o /etc/apt/keyrings/docker.asc && \
chmod a+r /etc/apt/keyrings/docker.asc && \
echo \"deb [arch=$(dpkg --print-architecture) signed-by=/etc/apt/keyrings/docker.asc] https://download.docker.com/linux/$ID ${UBUNTU_CODENAME:-$VERSION_CODENAME} stable\" > /etc/apt/sources.list.d/docker.list && \
apt-get update && \
apt-get -y install docker-ce docker-ce-cli containerd.io docker-buildx-plugin docker-compose-plugin";

pub const INSTALL_DDEV: &str = "\
export DEBIAN_FRONTEND=noninteractive; \
apt-get update && apt-get -y install curl gpg && \
install -m 0755 -d /etc/apt/keyrings && \
curl -fsSL https://pkg.ddev.com/apt/gpg.key | gpg --dearmor --yes -o /etc/apt/keyrings/ddev.gpg && \
chmod a+r /etc/apt/keyrings/ddev.gpg && \
echo \"deb [signed-by=/etc/apt/keyrings/ddev.gpg] https://pkg.ddev.com/apt/ * *\" > /etc/apt/sources.list.d/ddev.list && \
apt-get update && apt-get -y install ddev && mkcert -install";

/// Create the operator's login user with docker access and the operator key.
pub fn create_user(login: &str, public_key: &str) -> String {
    let home = format!("/home/{login}");
    format!(
        "id -u {login} >/dev/null 2>&1 || useradd -m -s /bin/bash {login}; \
getent group docker >/dev/null || groupadd docker; \
usermod -aG docker {login}; \
install -d -m 700 -o {login} -g {login} {home}/.ssh && \
echo {key} > {home}/.ssh/authorized_keys && \
chown {login}:{login} {home}/.ssh/authorized_keys && \
chmod 600 {home}/.ssh/authorized_keys",
        key = shell_quote(public_key.trim()),
    )
}
